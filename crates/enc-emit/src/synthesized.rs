//! Synthesized members
//!
//! Provides [`SynthesizedState`], the baseline-owned record of every lambda,
//! closure (display class), lambda container, anonymous type and delegate a
//! delta has emitted, and the session pass that binds a generated body's
//! synthesized references to rows.
//!
//! # Reuse
//!
//! - lambdas and closures are matched per method through the syntax map; a
//!   lambda whose signature or closure changed counts as new
//! - anonymous types and delegates are keyed by the content hash of their
//!   shape and reused whenever the key is known
//! - display classes gain fields for new captures and never lose fields
//! - old lambdas nobody correlates get a throwing stub body
//!
//! New members carry a `#<generation>` suffix so their names never collide
//! with members of earlier generations.

use crate::baseline::BodyKey;
use crate::codegen::GeneratedBody;
use crate::error::EmitError;
use crate::resolver::{WellKnownSymbolResolver, WellKnownType};
use crate::session::DeltaSession;
use enc_metadata::{
    encode_property_signature, field_flags, method_flags, method_impl_flags, semantics, type_flags, ContentHash,
    Handle, IlBuilder, MethodSignature, OpCode, RowData, SignatureType, TableIndex, Token,
};
use enc_symbols::{AnonymousTypeShape, DeclKey, DelegateShape, SyntaxMap, SyntaxNodeId, TypeSymbol};
use im::{OrdMap, Vector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lambda or local function emitted as a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaRecord {
    /// Per-method lambda ordinal
    pub ordinal: u32,
    /// Lambda syntax in the generation that last emitted it
    pub syntax: SyntaxNodeId,
    pub name: String,
    pub method: Handle,
    /// Encoded method signature
    pub signature: Vec<u8>,
    /// Ordinal of the closure the lambda is an instance method of
    pub closure: Option<u32>,
    /// Static delegate cache field on the lambda container
    pub cache_field: Option<Handle>,
    pub generation: u32,
    /// Body replaced by a throwing stub
    pub deleted: bool,
}

/// Field of a display class holding one captured variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedField {
    pub variable: String,
    pub field_name: String,
    pub ty: TypeSymbol,
    pub handle: Handle,
}

/// Display class of a closure scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureRecord {
    /// Per-method closure ordinal
    pub ordinal: u32,
    /// Scope syntax in the generation that last used the closure
    pub syntax: SyntaxNodeId,
    pub name: String,
    pub ty: Handle,
    pub ctor: Handle,
    pub fields: Vec<CapturedField>,
    pub generation: u32,
}

/// `<>c` singleton holding the static lambdas of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub name: String,
    pub ty: Handle,
    /// `<>9` singleton field
    pub instance: Handle,
    pub ctor: Handle,
    pub cctor: Handle,
    pub generation: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousTypeRecord {
    pub name: String,
    pub ty: Handle,
    pub ctor: Handle,
    /// Getter method per member, in shape order
    pub getters: Vec<(String, Handle)>,
    pub generation: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateRecord {
    pub name: String,
    pub ty: Handle,
    pub ctor: Handle,
    pub invoke: Handle,
    pub generation: u32,
}

/// Synthesized members emitted up to a generation
#[derive(Debug, Clone, Default)]
pub struct SynthesizedState {
    pub(crate) lambdas: OrdMap<DeclKey, Vector<LambdaRecord>>,
    pub(crate) closures: OrdMap<DeclKey, Vector<ClosureRecord>>,
    pub(crate) containers: OrdMap<DeclKey, ContainerRecord>,
    pub(crate) anonymous_types: OrdMap<ContentHash, AnonymousTypeRecord>,
    pub(crate) delegates: OrdMap<ContentHash, DelegateRecord>,
    pub(crate) hot_reload_exception: Option<Token>,
}

impl SynthesizedState {
    /// Lambdas of a method, in ordinal order
    #[must_use]
    pub fn lambdas_of(&self, method: &DeclKey) -> Vec<LambdaRecord> {
        self.lambdas
            .get(method)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn closures_of(&self, method: &DeclKey) -> Vec<ClosureRecord> {
        self.closures
            .get(method)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn container_of(&self, ty: &DeclKey) -> Option<&ContainerRecord> {
        self.containers.get(ty)
    }

    #[must_use]
    pub fn anonymous_type(&self, shape: &AnonymousTypeShape) -> Option<&AnonymousTypeRecord> {
        self.anonymous_types.get(&shape.key())
    }

    #[must_use]
    pub fn delegate(&self, shape: &DelegateShape) -> Option<&DelegateRecord> {
        self.delegates.get(&shape.key())
    }

    /// `HotReloadException` constructor used by deletion stubs
    #[inline]
    #[must_use]
    pub const fn hot_reload_exception(&self) -> Option<Token> {
        self.hot_reload_exception
    }

    /// Whether every anonymous type and delegate `ty` mentions is known
    #[must_use]
    pub fn knows_shapes(&self, ty: &TypeSymbol) -> bool {
        let mut known = true;
        ty.walk(&mut |t| match t {
            TypeSymbol::Anonymous(shape) => known &= self.anonymous_types.contains_key(&shape.key()),
            TypeSymbol::Delegate(shape) => known &= self.delegates.contains_key(&shape.key()),
            _ => {}
        });
        known
    }

    /// Every row a synthesized member occupies
    pub(crate) fn rows(&self) -> Vec<Handle> {
        let mut rows = Vec::new();
        for record in self.lambdas.values().flat_map(|v| v.iter()) {
            rows.push(record.method);
            rows.extend(record.cache_field);
        }
        for record in self.closures.values().flat_map(|v| v.iter()) {
            rows.extend([record.ty, record.ctor]);
            rows.extend(record.fields.iter().map(|f| f.handle));
        }
        for record in self.containers.values() {
            rows.extend([record.ty, record.instance, record.ctor, record.cctor]);
        }
        for record in self.anonymous_types.values() {
            rows.extend([record.ty, record.ctor]);
            rows.extend(record.getters.iter().map(|(_, getter)| *getter));
        }
        for record in self.delegates.values() {
            rows.extend([record.ty, record.ctor, record.invoke]);
        }
        rows
    }

    pub(crate) fn rekey_method(&mut self, old: &DeclKey, new: &DeclKey) {
        if let Some(lambdas) = self.lambdas.remove(old) {
            self.lambdas.insert(new.clone(), lambdas);
        }
        if let Some(closures) = self.closures.remove(old) {
            self.closures.insert(new.clone(), closures);
        }
    }
}

/// Entry of the per-generation synthesized-member report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedMemberReport {
    pub name: String,
    pub token: Token,
    /// Generation that created the member
    pub generation: u32,
    /// Whether an earlier generation's member was reused
    pub reused: bool,
}

/// Tokens of the synthesized members one body refers to
#[derive(Debug, Clone, Default)]
pub(crate) struct BodyContext {
    pub(crate) lambdas: Vec<Token>,
    pub(crate) caches: Vec<Option<Token>>,
    pub(crate) closure_ctors: Vec<Token>,
    pub(crate) closure_fields: Vec<BTreeMap<String, Token>>,
    pub(crate) container_instance: Option<Token>,
}

/// Lambda body still to be emitted
#[derive(Debug, Clone)]
pub(crate) struct LambdaBody {
    pub(crate) index: usize,
    pub(crate) method: Handle,
    pub(crate) name: String,
    pub(crate) body: BodyKey,
}

const SYNTHESIZED_TYPE: u32 = type_flags::NESTED_PRIVATE | type_flags::SEALED | type_flags::BEFORE_FIELD_INIT;
pub(crate) const CONSTRUCTOR: u16 =
    method_flags::PUBLIC | method_flags::HIDE_BY_SIG | method_flags::SPECIAL_NAME | method_flags::RT_SPECIAL_NAME;
const LAMBDA_METHOD: u16 = method_flags::ASSEMBLY | method_flags::HIDE_BY_SIG;

fn lambda_row(record: &LambdaRecord) -> RowData {
    RowData::MethodDef {
        rva: None,
        impl_flags: method_impl_flags::IL,
        flags: LAMBDA_METHOD,
        name: record.name.clone(),
        signature: record.signature.clone(),
    }
}

impl DeltaSession<'_> {
    fn suffixed(&self, name: &str) -> String {
        format!("{name}#{}", self.generation)
    }

    pub(crate) fn report(&mut self, name: &str, token: Token, generation: u32, reused: bool) {
        if self.report.iter().any(|r| r.token == token) {
            return;
        }
        tracing::debug!(name, token = %token, generation, reused, "synthesized member");
        self.report.push(SynthesizedMemberReport {
            name: name.to_owned(),
            token,
            generation,
            reused,
        });
    }

    /// Apply `[CompilerGenerated]` when it can be resolved
    pub(crate) fn mark_compiler_generated(&mut self, handle: Handle) {
        if let Some(attribute) = self.compiler_generated_attribute() {
            self.touch_attributes(handle, vec![attribute]);
        }
    }

    /// Attach a body built in place to a synthesized method
    pub(crate) fn attach_body(&mut self, method: Handle, builder: IlBuilder, max_stack: u16) -> Result<(), EmitError> {
        let code = builder.finish()?;
        let offset = self.writer.append_body(&enc_metadata::MethodBody::new(code, max_stack));
        self.writer.set_rva(method, offset)
    }

    /// Public parameterless constructor chaining to `System.Object`
    fn define_default_constructor(&mut self, ty: Handle) -> Result<Handle, EmitError> {
        let object_ctor = self.well_known_constructor(WellKnownType::Object, &[])?;
        let ctor = self.define_method(
            ty,
            ".ctor".to_owned(),
            CONSTRUCTOR,
            method_impl_flags::IL,
            &MethodSignature::instance(SignatureType::Void, Vec::new()),
        )?;
        let mut il = IlBuilder::new();
        il.ldarg(0);
        il.token(OpCode::Call, object_ctor)?;
        il.op(OpCode::Ret)?;
        self.attach_body(ctor, il, 1)?;
        Ok(ctor)
    }

    /// Bind the lambdas and closures of a generated body to rows
    pub(crate) fn prepare_synthesized(
        &mut self,
        method: &DeclKey,
        generated: &GeneratedBody,
        syntax_map: Option<&SyntaxMap>,
    ) -> Result<(BodyContext, Vec<LambdaBody>), EmitError> {
        let mut ctx = BodyContext::default();
        let old_lambdas = self.synthesized.lambdas_of(method);
        if generated.lambdas.is_empty() && generated.closures.is_empty() && old_lambdas.is_empty() {
            return Ok((ctx, Vec::new()));
        }
        let ty = method
            .containing_type()
            .ok_or_else(|| EmitError::invariant(format!("{method} has no declaring type")))?
            .clone();
        let type_row = self.row_of(&ty)?;
        let method_ordinal = self.compilation.method_ordinal(method).unwrap_or(0);

        // closures
        let old_closures = self.synthesized.closures_of(method);
        let mut closures = old_closures.clone();
        let mut taken = vec![false; old_closures.len()];
        let mut closure_ordinals = Vec::with_capacity(generated.closures.len());
        for def in &generated.closures {
            let found = syntax_map.and_then(|map| {
                (0..old_closures.len()).find(|&i| !taken[i] && map.correlates(old_closures[i].syntax, def.scope_syntax))
            });
            let index = match found {
                Some(i) => {
                    taken[i] = true;
                    let mut record = closures[i].clone();
                    self.extend_closure(&mut record, &def.captured)?;
                    self.report(&record.name, record.ty.token(), record.generation, true);
                    closures[i] = record;
                    i
                }
                None => {
                    let ordinal = closures.iter().map(|r| r.ordinal + 1).max().unwrap_or(0);
                    let record = self.create_closure(type_row, method_ordinal, ordinal, def.scope_syntax, &def.captured)?;
                    closures.push(record);
                    closures.len() - 1
                }
            };
            let record = &mut closures[index];
            record.syntax = def.scope_syntax;
            ctx.closure_ctors.push(record.ctor.token());
            ctx.closure_fields.push(
                record
                    .fields
                    .iter()
                    .filter(|f| def.captured.iter().any(|(v, t)| *v == f.variable && *t == f.ty))
                    .map(|f| (f.variable.clone(), f.handle.token()))
                    .collect(),
            );
            closure_ordinals.push((record.ordinal, record.ty));
        }
        if !closures.is_empty() {
            self.synthesized.closures.insert(method.clone(), closures.into_iter().collect());
        }

        // lambdas
        let mut lambdas = old_lambdas.clone();
        let mut taken = vec![false; old_lambdas.len()];
        let mut bodies = Vec::with_capacity(generated.lambdas.len());
        for (index, def) in generated.lambdas.iter().enumerate() {
            let closure = match def.closure {
                Some(c) => Some(*closure_ordinals.get(c).ok_or_else(|| {
                    EmitError::invariant(format!("lambda {index} of {method} refers to undeclared closure {c}"))
                })?),
                None => None,
            };
            let return_type = self.signature_type(&def.return_type)?;
            let params = self.signature_types(&def.params)?;
            let signature = MethodSignature::instance(return_type, params);
            let encoded = signature.encode()?;
            let closure_ordinal = closure.map(|(ordinal, _)| ordinal);

            let found = syntax_map.and_then(|map| {
                (0..old_lambdas.len()).find(|&i| {
                    let old = &old_lambdas[i];
                    !taken[i]
                        && !old.deleted
                        && old.closure == closure_ordinal
                        && old.signature == encoded
                        && map.correlates(old.syntax, def.syntax)
                })
            });
            let slot = match found {
                Some(i) => {
                    taken[i] = true;
                    let record = lambdas[i].clone();
                    self.writer.update(record.method, lambda_row(&record))?;
                    self.report(&record.name, record.method.token(), record.generation, true);
                    i
                }
                None => {
                    let ordinal = lambdas.iter().map(|r| r.ordinal + 1).max().unwrap_or(0);
                    let name = self.suffixed(&format!("<{}>b__{method_ordinal}_{ordinal}", method.name()));
                    let (owner, cache_field) = match closure {
                        Some((_, closure_type)) => (closure_type, None),
                        None => {
                            let container = self.lambda_container(&ty, type_row)?;
                            let cache = self.define_field(
                                container.ty,
                                self.suffixed(&format!("<>9__{method_ordinal}_{ordinal}")),
                                field_flags::PUBLIC | field_flags::STATIC,
                                &SignatureType::Object,
                            )?;
                            (container.ty, Some(cache))
                        }
                    };
                    let handle = self.define_method(owner, name.clone(), LAMBDA_METHOD, method_impl_flags::IL, &signature)?;
                    self.report(&name, handle.token(), self.generation, false);
                    lambdas.push(LambdaRecord {
                        ordinal,
                        syntax: def.syntax,
                        name,
                        method: handle,
                        signature: encoded,
                        closure: closure_ordinal,
                        cache_field,
                        generation: self.generation,
                        deleted: false,
                    });
                    lambdas.len() - 1
                }
            };
            let record = &mut lambdas[slot];
            record.syntax = def.syntax;
            ctx.lambdas.push(record.method.token());
            ctx.caches.push(record.cache_field.map(|h| h.token()));
            bodies.push(LambdaBody {
                index,
                method: record.method,
                name: record.name.clone(),
                body: BodyKey::Lambda {
                    method: method.clone(),
                    ordinal: record.ordinal,
                },
            });
            if closure.is_none() {
                let container = self.lambda_container(&ty, type_row)?;
                ctx.container_instance = Some(container.instance.token());
            }
        }

        for (i, record) in lambdas.iter_mut().enumerate().take(old_lambdas.len()) {
            if !taken[i] && !record.deleted {
                self.stub_lambda(record)?;
            }
        }
        if !lambdas.is_empty() {
            self.synthesized.lambdas.insert(method.clone(), lambdas.into_iter().collect());
        }
        Ok((ctx, bodies))
    }

    /// Stub every live lambda of a deleted method
    pub(crate) fn stub_lambdas_of(&mut self, method: &DeclKey) -> Result<(), EmitError> {
        let mut lambdas = self.synthesized.lambdas_of(method);
        if lambdas.is_empty() {
            return Ok(());
        }
        for record in lambdas.iter_mut().filter(|r| !r.deleted) {
            self.stub_lambda(record)?;
        }
        self.synthesized.lambdas.insert(method.clone(), lambdas.into_iter().collect());
        Ok(())
    }

    fn stub_lambda(&mut self, record: &mut LambdaRecord) -> Result<(), EmitError> {
        if self.options.emit_deleted_member_stubs {
            let message = self.options.deleted_lambda_message.clone();
            self.write_stub(record.method, lambda_row(record), &message)?;
        }
        tracing::debug!(name = %record.name, "lambda removed");
        record.deleted = true;
        Ok(())
    }

    fn create_closure(
        &mut self,
        owner: Handle,
        method_ordinal: u32,
        ordinal: u32,
        syntax: SyntaxNodeId,
        captured: &[(String, TypeSymbol)],
    ) -> Result<ClosureRecord, EmitError> {
        let name = self.suffixed(&format!("<>c__DisplayClass{method_ordinal}_{ordinal}"));
        let object = self.type_ref(WellKnownType::Object.full_name())?;
        let ty = self.define_type("", name.clone(), SYNTHESIZED_TYPE, Some(object), Some(owner))?;
        let ctor = self.define_default_constructor(ty)?;
        self.mark_compiler_generated(ty);
        self.report(&name, ty.token(), self.generation, false);
        let mut record = ClosureRecord {
            ordinal,
            syntax,
            name,
            ty,
            ctor,
            fields: Vec::new(),
            generation: self.generation,
        };
        self.extend_closure(&mut record, captured)?;
        Ok(record)
    }

    /// Add fields for captures the display class does not hold yet
    fn extend_closure(&mut self, record: &mut ClosureRecord, captured: &[(String, TypeSymbol)]) -> Result<(), EmitError> {
        for (variable, ty) in captured {
            if record.fields.iter().any(|f| f.variable == *variable && f.ty == *ty) {
                continue;
            }
            let field_name = if record.fields.iter().any(|f| f.field_name == *variable) {
                self.suffixed(variable)
            } else {
                variable.clone()
            };
            let signature = self.signature_type(ty)?;
            let handle = self.define_field(record.ty, field_name.clone(), field_flags::PUBLIC, &signature)?;
            record.fields.push(CapturedField {
                variable: variable.clone(),
                field_name,
                ty: ty.clone(),
                handle,
            });
        }
        Ok(())
    }

    /// `<>c` container of a type, created on first use
    fn lambda_container(&mut self, ty: &DeclKey, type_row: Handle) -> Result<ContainerRecord, EmitError> {
        if let Some(container) = self.synthesized.containers.get(ty) {
            let container = container.clone();
            self.report(&container.name, container.ty.token(), container.generation, true);
            return Ok(container);
        }
        let name = self.suffixed("<>c");
        let object = self.type_ref(WellKnownType::Object.full_name())?;
        let container = self.define_type("", name.clone(), SYNTHESIZED_TYPE, Some(object), Some(type_row))?;
        let instance = self.define_field(
            container,
            "<>9".to_owned(),
            field_flags::PUBLIC | field_flags::STATIC | field_flags::INIT_ONLY,
            &SignatureType::Class(container.token()),
        )?;
        let ctor = self.define_default_constructor(container)?;
        let cctor = self.define_method(
            container,
            ".cctor".to_owned(),
            method_flags::PRIVATE
                | method_flags::STATIC
                | method_flags::HIDE_BY_SIG
                | method_flags::SPECIAL_NAME
                | method_flags::RT_SPECIAL_NAME,
            method_impl_flags::IL,
            &MethodSignature::static_method(SignatureType::Void, Vec::new()),
        )?;
        let mut il = IlBuilder::new();
        il.token(OpCode::Newobj, ctor.token())?;
        il.token(OpCode::Stsfld, instance.token())?;
        il.op(OpCode::Ret)?;
        self.attach_body(cctor, il, 1)?;
        self.mark_compiler_generated(container);
        self.report(&name, container.token(), self.generation, false);

        let record = ContainerRecord {
            name,
            ty: container,
            instance,
            ctor,
            cctor,
            generation: self.generation,
        };
        self.synthesized.containers.insert(ty.clone(), record.clone());
        Ok(record)
    }

    /// Anonymous type of a shape, reusing an earlier generation's type
    pub(crate) fn anonymous_type(&mut self, shape: &AnonymousTypeShape) -> Result<AnonymousTypeRecord, EmitError> {
        let key = shape.key();
        if let Some(record) = self.synthesized.anonymous_types.get(&key) {
            let record = record.clone();
            self.report(&record.name, record.ty.token(), record.generation, true);
            return Ok(record);
        }
        let member_types = shape
            .members
            .iter()
            .map(|(_, ty)| self.signature_type(ty))
            .collect::<Result<Vec<_>, _>>()?;
        let index = self.synthesized.anonymous_types.len();
        let name = self.suffixed(&format!("<>f__AnonymousType{index}"));
        let object = self.type_ref(WellKnownType::Object.full_name())?;
        let object_ctor = self.well_known_constructor(WellKnownType::Object, &[])?;
        let ty = self.define_type("", name.clone(), type_flags::SEALED, Some(object), None)?;

        let mut fields = Vec::with_capacity(member_types.len());
        for ((member, _), signature) in shape.members.iter().zip(&member_types) {
            fields.push(self.define_field(
                ty,
                format!("<{member}>i__Field"),
                field_flags::PRIVATE | field_flags::INIT_ONLY,
                signature,
            )?);
        }

        let ctor = self.define_method(
            ty,
            ".ctor".to_owned(),
            CONSTRUCTOR,
            method_impl_flags::IL,
            &MethodSignature::instance(SignatureType::Void, member_types.clone()),
        )?;
        let names: Vec<&str> = shape.members.iter().map(|(n, _)| n.as_str()).collect();
        self.define_params(ctor, &names)?;
        let mut il = IlBuilder::new();
        il.ldarg(0);
        il.token(OpCode::Call, object_ctor)?;
        for (i, field) in fields.iter().enumerate() {
            il.ldarg(0);
            il.ldarg(crate::definitions::ordinal(i + 1)?);
            il.token(OpCode::Stfld, field.token())?;
        }
        il.op(OpCode::Ret)?;
        self.attach_body(ctor, il, 2)?;

        let map = self.property_map_for(ty)?;
        let mut getters = Vec::with_capacity(fields.len());
        for (((member, _), signature), field) in shape.members.iter().zip(&member_types).zip(&fields) {
            let getter = self.define_method(
                ty,
                format!("get_{member}"),
                method_flags::PUBLIC | method_flags::HIDE_BY_SIG | method_flags::SPECIAL_NAME,
                method_impl_flags::IL,
                &MethodSignature::instance(signature.clone(), Vec::new()),
            )?;
            let mut il = IlBuilder::new();
            il.ldarg(0);
            il.token(OpCode::Ldfld, field.token())?;
            il.op(OpCode::Ret)?;
            self.attach_body(getter, il, 1)?;

            let property = self.allocator.allocate(TableIndex::Property)?;
            self.writer.add(
                map,
                property,
                RowData::Property {
                    flags: 0,
                    name: member.clone(),
                    signature: encode_property_signature(true, signature, &[])?,
                },
            )?;
            self.method_semantics(getter.token(), property.token(), semantics::GETTER)?;
            getters.push((member.clone(), getter));
        }
        self.mark_compiler_generated(ty);
        self.report(&name, ty.token(), self.generation, false);

        let record = AnonymousTypeRecord {
            name,
            ty,
            ctor,
            getters,
            generation: self.generation,
        };
        self.synthesized.anonymous_types.insert(key, record.clone());
        Ok(record)
    }

    /// Delegate type of a shape, reusing an earlier generation's type
    pub(crate) fn delegate_type(&mut self, shape: &DelegateShape) -> Result<DelegateRecord, EmitError> {
        let key = shape.key();
        if let Some(record) = self.synthesized.delegates.get(&key) {
            let record = record.clone();
            self.report(&record.name, record.ty.token(), record.generation, true);
            return Ok(record);
        }
        let base = self.resolver().resolve_type(WellKnownType::MulticastDelegate)?;
        let extends = self.type_token(&base)?;
        let return_type = self.signature_type(&shape.return_type)?;
        let params = self.signature_types(&shape.params)?;
        let index = self.synthesized.delegates.len();
        let name = self.suffixed(&format!("<>f__AnonymousDelegate{index}"));
        let ty = self.define_type("", name.clone(), type_flags::SEALED, Some(extends), None)?;

        let ctor = self.define_method(
            ty,
            ".ctor".to_owned(),
            CONSTRUCTOR,
            method_impl_flags::RUNTIME,
            &MethodSignature::instance(SignatureType::Void, vec![SignatureType::Object, SignatureType::IntPtr]),
        )?;
        self.define_params(ctor, &["object", "method"])?;
        let invoke = self.define_method(
            ty,
            "Invoke".to_owned(),
            method_flags::PUBLIC | method_flags::HIDE_BY_SIG | method_flags::VIRTUAL | method_flags::NEW_SLOT,
            method_impl_flags::RUNTIME,
            &MethodSignature::instance(return_type, params),
        )?;
        let arg_names: Vec<String> = (1..=shape.params.len()).map(|i| format!("arg{i}")).collect();
        let arg_names: Vec<&str> = arg_names.iter().map(String::as_str).collect();
        self.define_params(invoke, &arg_names)?;
        self.mark_compiler_generated(ty);
        self.report(&name, ty.token(), self.generation, false);

        let record = DelegateRecord {
            name,
            ty,
            ctor,
            invoke,
            generation: self.generation,
        };
        self.synthesized.delegates.insert(key, record.clone());
        Ok(record)
    }
}
