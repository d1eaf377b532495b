//! Member deletion
//!
//! A deleted member keeps its row and token. Methods get a stub body that
//! throws `HotReloadException`; every deleted member is recorded in the
//! baseline and, when the runtime provides it, marked
//! `[MetadataUpdateDeleted]`. Reinsertion later reuses the same rows.

use crate::baseline::{BodyKey, DeletedMemberRecord};
use crate::error::{EmitError, MissingSymbolError};
use crate::resolver::{WellKnownSymbolResolver, WellKnownType};
use crate::session::DeltaSession;
use crate::synthesized::CONSTRUCTOR;
use enc_metadata::{field_flags, method_impl_flags, type_flags, Handle, IlBuilder, MethodSignature, OpCode, RowData, SignatureType, Token};
use enc_symbols::{DeclKey, DeclKind, SymbolDef, TypeSymbol};

/// Stub code passed to `HotReloadException` for deleted members
const DELETED_MEMBER_CODE: i32 = -2;

impl<'a> DeltaSession<'a> {
    /// Delete a member of the baseline program
    pub(crate) fn delete_member(&mut self, key: &DeclKey, handle: Handle) -> Result<(), EmitError> {
        let old = self.old_symbol(key)?;
        match key.kind() {
            DeclKind::Method => self.delete_method(old, handle)?,
            DeclKind::Field => self.mark_deleted(key, handle, false),
            DeclKind::Property | DeclKind::Event => {
                self.mark_deleted(key, handle, false);
                for accessor in old.accessors() {
                    if self.deleted.contains_key(accessor) {
                        continue;
                    }
                    let row = self.row_of(accessor)?;
                    let accessor = self.old_symbol(accessor)?;
                    self.delete_method(accessor, row)?;
                }
            }
            DeclKind::Type => {
                self.mark_deleted(key, handle, false);
                let baseline = self.baseline;
                for member in baseline.compilation().descendants(key) {
                    if self.deleted.contains_key(&member.key) {
                        continue;
                    }
                    let Some(row) = self.definitions.get(&member.key).map(|r| r.handle) else {
                        continue;
                    };
                    match member.key.kind() {
                        DeclKind::Method => self.delete_method(member, row)?,
                        DeclKind::Parameter | DeclKind::GenericParam => {}
                        _ => self.mark_deleted(&member.key, row, false),
                    }
                }
            }
            DeclKind::Parameter | DeclKind::GenericParam => {
                return Err(EmitError::invariant(format!("{key} cannot be deleted on its own")));
            }
        }
        tracing::debug!(symbol = %key, token = %handle.token(), "deleted member");
        Ok(())
    }

    fn old_symbol(&self, key: &DeclKey) -> Result<&'a SymbolDef, EmitError> {
        let baseline: &'a crate::baseline::Baseline = self.baseline;
        baseline
            .compilation()
            .get(key)
            .ok_or_else(|| EmitError::invariant(format!("deleted member {key} is not declared in the baseline")))
    }

    fn delete_method(&mut self, old: &'a SymbolDef, handle: Handle) -> Result<(), EmitError> {
        let has_body = old.as_method().is_some_and(|m| m.has_body());
        let stubbed = if has_body && self.options.emit_deleted_member_stubs {
            let row = self.definition_row(old)?;
            let message = self.options.deleted_method_message.clone();
            self.write_stub(handle, row, &message)?;
            true
        } else {
            false
        };
        self.locals.remove(&BodyKey::Member(old.key.clone()));
        self.mark_deleted(&old.key, handle, stubbed);
        self.stub_lambdas_of(&old.key)
    }

    fn mark_deleted(&mut self, key: &DeclKey, handle: Handle, stub_body_generated: bool) {
        self.deleted.insert(
            key.clone(),
            DeletedMemberRecord {
                token: handle.token(),
                stub_body_generated,
                generation: self.generation,
            },
        );
        if let Some(attribute) = self.deleted_member_attribute() {
            let mut desired = self.current_attributes(handle);
            if !desired.contains(&attribute) {
                desired.push(attribute);
            }
            self.touch_attributes(handle, desired);
        }
    }

    /// Rewrite `method` with a body that throws `HotReloadException(message, -2)`
    pub(crate) fn write_stub(&mut self, method: Handle, row: RowData, message: &str) -> Result<(), EmitError> {
        self.writer.update(method, row)?;
        let ctor = self.hot_reload_exception_constructor()?;
        let text = self.writer.intern(message)?;
        let mut il = IlBuilder::new();
        il.token(OpCode::Ldstr, text)?;
        il.ldc_i4(DELETED_MEMBER_CODE);
        il.token(OpCode::Newobj, ctor)?;
        il.op(OpCode::Throw)?;
        self.attach_body(method, il, 2)
    }

    /// Constructor `HotReloadException(string, int32)`, synthesized once per
    /// module when neither the program nor its references provide one
    fn hot_reload_exception_constructor(&mut self) -> Result<Token, EmitError> {
        if let Some(token) = self.synthesized.hot_reload_exception {
            return Ok(token);
        }
        let token = match self.resolver().existing_hot_reload_exception() {
            Some(target) => self.member_target_token(&target, None)?,
            None => self.synthesize_hot_reload_exception()?,
        };
        self.synthesized.hot_reload_exception = Some(token);
        Ok(token)
    }

    fn synthesize_hot_reload_exception(&mut self) -> Result<Token, EmitError> {
        let exception_ctor = self.well_known_constructor(WellKnownType::Exception, &[TypeSymbol::STRING])?;
        let compiler_generated = self.compiler_generated_attribute().ok_or_else(|| {
            MissingSymbolError::new(format!("{}..ctor()", WellKnownType::CompilerGeneratedAttribute.full_name()))
        })?;
        let exception = self.resolver().resolve_type(WellKnownType::Exception)?;
        let extends = self.type_token(&exception)?;

        let (namespace, name) = WellKnownType::HotReloadException.split_name();
        let ty = self.define_type(namespace, name.to_owned(), type_flags::SEALED, Some(extends), None)?;
        let code = self.define_field(
            ty,
            "Code".to_owned(),
            field_flags::PUBLIC | field_flags::INIT_ONLY,
            &SignatureType::I4,
        )?;
        let ctor = self.define_method(
            ty,
            ".ctor".to_owned(),
            CONSTRUCTOR,
            method_impl_flags::IL,
            &MethodSignature::instance(SignatureType::Void, vec![SignatureType::String, SignatureType::I4]),
        )?;
        self.define_params(ctor, &["message", "code"])?;

        let mut il = IlBuilder::new();
        il.ldarg(0);
        il.ldarg(1);
        il.token(OpCode::Call, exception_ctor)?;
        il.ldarg(0);
        il.ldarg(2);
        il.token(OpCode::Stfld, code.token())?;
        il.op(OpCode::Ret)?;
        self.attach_body(ctor, il, 2)?;

        let mut attributes = vec![compiler_generated];
        attributes.extend(self.well_known_attribute(WellKnownType::EmbeddedAttribute));
        self.touch_attributes(ty, attributes);
        self.report(WellKnownType::HotReloadException.full_name(), ty.token(), self.generation, false);
        tracing::info!(token = %ty.token(), "synthesized HotReloadException");
        Ok(ctor.token())
    }
}
