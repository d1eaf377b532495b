//! Method body re-emission
//!
//! Lowers the symbolic IL of a generated body to bytes: member operands are
//! bound to tokens of the current generation, locals are mapped onto the
//! previous slot layout, and the local signature gets a StandAloneSig row.

use crate::baseline::BodyKey;
use crate::codegen::{IlOp, MemberTarget, MethodIl};
use crate::debug_info::read_method_locals;
use crate::error::{Diagnostic, DiagnosticCode, EmitError};
use crate::locals::{LocalSlotMap, LocalSlotPreserver, SlotTypeEquivalence};
use crate::session::DeltaSession;
use crate::synthesized::{BodyContext, SynthesizedState};
use enc_metadata::{
    encode_field_signature, encode_local_signature, Handle, IlBuilder, Label, MethodBody, OpCode, RowData, TableIndex,
    Token,
};
use enc_symbols::{DeclKey, SyntaxMap, TypeSymbol};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Body written to the IL stream of a delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedBody {
    /// MethodDef token the body belongs to
    pub method: Token,
    pub name: String,
    /// Offset of the body header in the IL stream
    pub offset: u32,
    /// Slot descriptions, e.g. `int32 V_0 //x` or `[unchanged] V_1`
    pub locals: Vec<String>,
}

/// Slot types match when equal and every anonymous type or delegate they
/// mention was already emitted before this generation
struct KnownShapeEquivalence<'s> {
    known: &'s SynthesizedState,
}

impl SlotTypeEquivalence for KnownShapeEquivalence<'_> {
    fn equivalent(&self, old: &TypeSymbol, new: &TypeSymbol) -> bool {
        old == new && self.known.knows_shapes(new)
    }
}

fn slot(indices: &[u16], local: u16) -> Result<u16, EmitError> {
    indices
        .get(usize::from(local))
        .copied()
        .ok_or_else(|| EmitError::invariant(format!("body uses undeclared local {local}")))
}

fn label(builder: &mut IlBuilder, labels: &mut BTreeMap<u32, Label>, id: u32) -> Label {
    *labels.entry(id).or_insert_with(|| builder.define_label())
}

fn missing(what: &str, index: usize) -> EmitError {
    EmitError::invariant(format!("body refers to {what} {index} the code generator did not declare"))
}

impl DeltaSession<'_> {
    /// Generate and write the body of a method along with its lambdas
    pub(crate) fn emit_method_body(
        &mut self,
        key: &DeclKey,
        handle: Handle,
        syntax_map: Option<&SyntaxMap>,
    ) -> Result<(), EmitError> {
        let compilation = self.compilation;
        let generated = self.generator.generate(compilation, key).map_err(|err| {
            EmitError::from(
                Diagnostic::new(DiagnosticCode::CodeGenerationFailed, err.to_string())
                    .with_symbol(key.to_string())
                    .with_token(handle.token()),
            )
        })?;
        let (ctx, lambda_bodies) = self.prepare_synthesized(key, &generated, syntax_map)?;

        let body_key = BodyKey::Member(key.clone());
        let previous = self.previous_locals(&body_key, handle)?;
        self.emit_il(body_key, handle, key.to_string(), &generated.il, previous.as_deref(), syntax_map, &ctx)?;

        for pending in lambda_bodies {
            let lambda = generated.lambdas.get(pending.index).ok_or_else(|| missing("lambda", pending.index))?;
            let previous = self.previous_locals(&pending.body, pending.method)?;
            self.emit_il(
                pending.body,
                pending.method,
                pending.name,
                &lambda.body,
                previous.as_deref(),
                syntax_map,
                &ctx,
            )?;
        }
        Ok(())
    }

    /// Slot layout the body had before this delta
    fn previous_locals(&self, body: &BodyKey, handle: Handle) -> Result<Option<Arc<LocalSlotMap>>, EmitError> {
        if let Some(map) = self.locals.get(body) {
            return Ok(Some(Arc::clone(map)));
        }
        let from_full_compile = match body {
            BodyKey::Member(key) => self
                .definitions
                .get(key)
                .is_some_and(|r| r.generation == 0)
                .then(|| key.to_string()),
            BodyKey::Lambda { method, ordinal } => self
                .synthesized
                .lambdas_of(method)
                .into_iter()
                .find(|r| r.ordinal == *ordinal && r.method == handle && r.generation == 0)
                .map(|r| r.name),
        };
        let Some(name) = from_full_compile else {
            return Ok(None);
        };
        let slots = read_method_locals(self.baseline.debug_info().as_ref(), &name, handle.token())?;
        Ok((!slots.is_empty()).then(|| Arc::new(LocalSlotMap::new(slots))))
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_il(
        &mut self,
        body: BodyKey,
        method: Handle,
        name: String,
        il: &MethodIl,
        previous: Option<&LocalSlotMap>,
        syntax_map: Option<&SyntaxMap>,
        ctx: &BodyContext,
    ) -> Result<(), EmitError> {
        let baseline = self.baseline;
        let equivalence = KnownShapeEquivalence {
            known: baseline.synthesized(),
        };
        let assignment = LocalSlotPreserver::new(previous, syntax_map, &equivalence).assign(&il.locals)?;

        let local_signature = if assignment.map.is_empty() {
            None
        } else {
            let types: Vec<TypeSymbol> = assignment.map.types().cloned().collect();
            let slots = self.signature_types(&types)?;
            let handle = self.allocator.allocate(TableIndex::StandAloneSig)?;
            self.writer.update(
                handle,
                RowData::StandAloneSig {
                    signature: encode_local_signature(&slots)?,
                },
            )?;
            Some(handle.token())
        };

        let code = self.lower(il, &assignment.indices, ctx)?;
        let mut body_bytes = MethodBody::new(code, il.max_stack);
        if let Some(signature) = local_signature {
            body_bytes = body_bytes.with_locals(signature);
        }
        let offset = self.writer.append_body(&body_bytes);
        self.writer.set_rva(method, offset)?;
        tracing::trace!(method = %method.token(), offset, locals = assignment.map.len(), "emitted body");

        self.bodies.push(EmittedBody {
            method: method.token(),
            name,
            offset,
            locals: assignment.map.descriptions(),
        });
        self.locals.insert(body, Arc::new(assignment.map));
        Ok(())
    }

    fn lower(&mut self, il: &MethodIl, slots: &[u16], ctx: &BodyContext) -> Result<Vec<u8>, EmitError> {
        let mut builder = IlBuilder::new();
        let mut labels = BTreeMap::new();
        for op in &il.ops {
            match op {
                IlOp::Nop => builder.op(OpCode::Nop)?,
                IlOp::Pop => builder.op(OpCode::Pop)?,
                IlOp::Dup => builder.op(OpCode::Dup)?,
                IlOp::Ret => builder.op(OpCode::Ret)?,
                IlOp::Throw => builder.op(OpCode::Throw)?,
                IlOp::Ldnull => builder.op(OpCode::Ldnull)?,
                IlOp::LdcI4(value) => builder.ldc_i4(*value),
                IlOp::Ldstr(value) => {
                    let token = self.writer.intern(value)?;
                    builder.token(OpCode::Ldstr, token)?;
                }
                IlOp::Ldarg(index) => builder.ldarg(*index),
                IlOp::Ldloc(local) => builder.ldloc(slot(slots, *local)?),
                IlOp::Stloc(local) => builder.stloc(slot(slots, *local)?),
                IlOp::Call(target)
                | IlOp::Callvirt(target)
                | IlOp::Newobj(target)
                | IlOp::Ldfld(target)
                | IlOp::Stfld(target)
                | IlOp::Ldsfld(target)
                | IlOp::Stsfld(target)
                | IlOp::Ldftn(target) => {
                    let opcode = match op {
                        IlOp::Call(_) => OpCode::Call,
                        IlOp::Callvirt(_) => OpCode::Callvirt,
                        IlOp::Newobj(_) => OpCode::Newobj,
                        IlOp::Ldfld(_) => OpCode::Ldfld,
                        IlOp::Stfld(_) => OpCode::Stfld,
                        IlOp::Ldsfld(_) => OpCode::Ldsfld,
                        IlOp::Stsfld(_) => OpCode::Stsfld,
                        _ => OpCode::Ldftn,
                    };
                    let token = self.member_target_token(target, Some(ctx))?;
                    builder.token(opcode, token)?;
                }
                IlOp::Label(id) => {
                    let target = label(&mut builder, &mut labels, *id);
                    builder.mark_label(target)?;
                }
                IlOp::Br(id) | IlOp::BrTrue(id) | IlOp::BrFalse(id) => {
                    let opcode = match op {
                        IlOp::BrTrue(_) => OpCode::Brtrue,
                        IlOp::BrFalse(_) => OpCode::Brfalse,
                        _ => OpCode::Br,
                    };
                    let target = label(&mut builder, &mut labels, *id);
                    builder.branch(opcode, target)?;
                }
            }
        }
        Ok(builder.finish()?)
    }

    /// Token of an instruction's member operand
    pub(crate) fn member_target_token(
        &mut self,
        target: &MemberTarget,
        ctx: Option<&BodyContext>,
    ) -> Result<Token, EmitError> {
        let context = || ctx.ok_or_else(|| EmitError::invariant("synthesized member referenced outside a body"));
        match target {
            MemberTarget::Definition(key) => {
                if let Some(ty) = key.containing_type() {
                    self.defined_type(ty)?;
                }
                Ok(self.row_of(key)?.token())
            }
            MemberTarget::ExternalMethod {
                owner,
                name,
                params,
                return_type,
                is_static,
            } => self.external_method_ref(owner, name, params, return_type, *is_static),
            MemberTarget::ExternalField { owner, name, ty } => {
                let parent = self.type_token(owner)?;
                let ty = self.signature_type(ty)?;
                self.member_ref(parent, name, encode_field_signature(&ty)?)
            }
            MemberTarget::Lambda(i) => context()?.lambdas.get(*i).copied().ok_or_else(|| missing("lambda", *i)),
            MemberTarget::LambdaCache(i) => context()?
                .caches
                .get(*i)
                .copied()
                .flatten()
                .ok_or_else(|| missing("static lambda cache", *i)),
            MemberTarget::LambdaContainerInstance => context()?
                .container_instance
                .ok_or_else(|| EmitError::invariant("body refers to the lambda container but has no static lambda")),
            MemberTarget::ClosureConstructor(i) => context()?
                .closure_ctors
                .get(*i)
                .copied()
                .ok_or_else(|| missing("closure", *i)),
            MemberTarget::ClosureField { closure, name } => context()?
                .closure_fields
                .get(*closure)
                .and_then(|fields| fields.get(name))
                .copied()
                .ok_or_else(|| EmitError::invariant(format!("closure {closure} does not capture '{name}'"))),
            MemberTarget::AnonymousTypeConstructor(shape) => Ok(self.anonymous_type(shape)?.ctor.token()),
            MemberTarget::AnonymousTypeGetter { shape, member } => self
                .anonymous_type(shape)?
                .getters
                .iter()
                .find(|(name, _)| name == member)
                .map(|(_, getter)| getter.token())
                .ok_or_else(|| EmitError::invariant(format!("{shape} has no member '{member}'"))),
            MemberTarget::DelegateConstructor(shape) => Ok(self.delegate_type(shape)?.ctor.token()),
            MemberTarget::DelegateInvoke(shape) => Ok(self.delegate_type(shape)?.invoke.token()),
        }
    }
}
