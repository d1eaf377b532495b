//! Delta session
//!
//! [`DeltaSession`] holds the mutable state of one generation: the maps
//! inherited from the baseline, the row allocator and the table writer. The
//! definition, body, synthesized-member and deletion passes extend it from
//! their own modules.

use crate::allocator::{ReferenceKey, RowAllocator};
use crate::attributes::{reconcile_attributes, AttributeRow, AttributeWrite};
use crate::baseline::{Baseline, BodyKey, DefinitionRecord, DeletedMemberRecord, ReplacedType};
use crate::codegen::{primitive_signature, MethodCodeGenerator};
use crate::config::EmitOptions;
use crate::emitter::EmittedBody;
use crate::error::{Diagnostic, DiagnosticCode, EmitError};
use crate::locals::LocalSlotMap;
use crate::matcher::ResolvedEdit;
use crate::resolver::{CompilationResolver, WellKnownSymbolResolver, WellKnownType};
use crate::synthesized::{SynthesizedMemberReport, SynthesizedState};
use crate::writer::{DeltaTableWriter, WrittenDelta};
use enc_metadata::{
    encode_custom_attribute, BlobWriter, Handle, MethodSignature, RowData, SignatureType, TableIndex, Token,
};
use enc_symbols::{signature_string, AttributeData, DeclKey, SymbolDef, SymbolTable, SyntaxMap, TypeKind, TypeSymbol};
use im::{OrdMap, Vector};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

/// Method whose body is emitted once all rows exist
#[derive(Debug, Clone)]
pub(crate) struct PendingBody {
    pub(crate) key: DeclKey,
    pub(crate) handle: Handle,
    pub(crate) syntax_map: Option<SyntaxMap>,
}

/// Result of a completed session
#[derive(Debug)]
pub(crate) struct SessionOutput {
    pub(crate) written: WrittenDelta,
    pub(crate) baseline: Baseline,
    pub(crate) bodies: Vec<EmittedBody>,
    pub(crate) report: Vec<SynthesizedMemberReport>,
}

/// Mutable emission state of one generation
pub(crate) struct DeltaSession<'a> {
    pub(crate) options: &'a EmitOptions,
    pub(crate) baseline: &'a Baseline,
    pub(crate) compilation: &'a SymbolTable,
    pub(crate) generator: &'a dyn MethodCodeGenerator,
    pub(crate) generation: u32,
    enc_id: Uuid,
    pub(crate) allocator: RowAllocator,
    pub(crate) writer: DeltaTableWriter,
    pub(crate) definitions: OrdMap<DeclKey, DefinitionRecord>,
    pub(crate) deleted: OrdMap<DeclKey, DeletedMemberRecord>,
    pub(crate) attributes: OrdMap<Handle, Vector<AttributeRow>>,
    pub(crate) property_maps: OrdMap<DeclKey, Handle>,
    pub(crate) event_maps: OrdMap<DeclKey, Handle>,
    pub(crate) references: OrdMap<ReferenceKey, Token>,
    pub(crate) locals: OrdMap<BodyKey, Arc<LocalSlotMap>>,
    pub(crate) synthesized: SynthesizedState,
    pub(crate) replaced_types: OrdMap<DeclKey, Vector<ReplacedType>>,
    /// Attributes each touched parent should carry after this delta
    pub(crate) pending_attributes: BTreeMap<Handle, Vec<AttributeData>>,
    /// Definitions whose rows this delta has written
    pub(crate) written: BTreeSet<DeclKey>,
    pub(crate) pending_bodies: Vec<PendingBody>,
    pub(crate) bodies: Vec<EmittedBody>,
    pub(crate) report: Vec<SynthesizedMemberReport>,
    warned_deleted_attribute: bool,
}

impl<'a> DeltaSession<'a> {
    pub(crate) fn new(
        options: &'a EmitOptions,
        baseline: &'a Baseline,
        compilation: &'a SymbolTable,
        generator: &'a dyn MethodCodeGenerator,
    ) -> Self {
        Self {
            options,
            baseline,
            compilation,
            generator,
            generation: baseline.generation() + 1,
            enc_id: Uuid::new_v4(),
            allocator: RowAllocator::new(baseline.table_sizes(), options.max_rows_per_table),
            writer: DeltaTableWriter::new(baseline.user_string_size()),
            definitions: baseline.definitions.clone(),
            deleted: baseline.deleted.clone(),
            attributes: baseline.attributes.clone(),
            property_maps: baseline.property_maps.clone(),
            event_maps: baseline.event_maps.clone(),
            references: baseline.references.clone(),
            locals: baseline.locals.clone(),
            synthesized: baseline.synthesized.clone(),
            replaced_types: baseline.replaced_types.clone(),
            pending_attributes: BTreeMap::new(),
            written: BTreeSet::new(),
            pending_bodies: Vec::new(),
            bodies: Vec::new(),
            report: Vec::new(),
            warned_deleted_attribute: false,
        }
    }

    /// Run every pass over the resolved edits
    pub(crate) fn apply(&mut self, edits: &[ResolvedEdit]) -> Result<(), EmitError> {
        for edit in edits {
            match edit {
                ResolvedEdit::Insert { key } => self.allocate_definition(key)?,
                ResolvedEdit::Replace { key, previous } => self.allocate_replacement(key, *previous)?,
                _ => {}
            }
        }

        for edit in edits {
            match edit {
                ResolvedEdit::Insert { key } | ResolvedEdit::Replace { key, .. } => self.write_definition(key)?,
                ResolvedEdit::Update {
                    old,
                    new,
                    handle,
                    syntax_map,
                } => self.rewrite_definition(old, new, *handle, syntax_map.clone())?,
                ResolvedEdit::Reinsert { key, handle } => self.reinsert(key, *handle)?,
                ResolvedEdit::Delete { .. } => {}
            }
        }

        for edit in edits {
            if let ResolvedEdit::Delete { key, handle } = edit {
                self.delete_member(key, *handle)?;
            }
        }

        let pending = std::mem::take(&mut self.pending_bodies);
        let mut emitted = BTreeSet::new();
        for body in pending {
            if emitted.insert(body.handle) {
                self.emit_method_body(&body.key, body.handle, body.syntax_map.as_ref())?;
            }
        }
        Ok(())
    }

    /// Reconcile attributes, assemble the delta and derive the next baseline
    pub(crate) fn finish(mut self, compilation: Arc<SymbolTable>) -> Result<SessionOutput, EmitError> {
        self.reconcile_pending_attributes()?;
        let written = self.writer.finish(self.generation, self.enc_id, self.baseline.enc_id())?;
        let baseline = Baseline {
            generation: self.generation,
            module_version_id: self.baseline.module_version_id(),
            enc_id: self.enc_id,
            compilation,
            debug_info: Arc::clone(self.baseline.debug_info()),
            table_sizes: self.allocator.sizes(),
            user_string_size: written.user_string_size,
            definitions: self.definitions,
            deleted: self.deleted,
            attributes: self.attributes,
            property_maps: self.property_maps,
            event_maps: self.event_maps,
            references: self.references,
            locals: self.locals,
            synthesized: self.synthesized,
            replaced_types: self.replaced_types,
        };
        Ok(SessionOutput {
            written,
            baseline,
            bodies: self.bodies,
            report: self.report,
        })
    }

    // ---- symbols and rows ----

    /// Declaration in the new compilation, else in the baseline's
    pub(crate) fn symbol(&self, key: &DeclKey) -> Result<&'a SymbolDef, EmitError> {
        let (compilation, baseline): (&'a SymbolTable, &'a Baseline) = (self.compilation, self.baseline);
        compilation
            .get(key)
            .or_else(|| baseline.compilation().get(key))
            .ok_or_else(|| EmitError::invariant(format!("no declaration for {key}")))
    }

    /// Row of a declaration known to this generation
    pub(crate) fn row_of(&self, key: &DeclKey) -> Result<Handle, EmitError> {
        self.definitions.get(key).map(|r| r.handle).ok_or_else(|| {
            Diagnostic::new(DiagnosticCode::UnresolvedSymbol, format!("symbol '{key}' has no metadata row"))
                .with_symbol(key.to_string())
                .into()
        })
    }

    pub(crate) fn resolver(&self) -> CompilationResolver<'a> {
        CompilationResolver::new(self.compilation)
    }

    // ---- type encoding ----

    /// Signature encoding of a type, creating reference rows and synthesized
    /// types as needed
    pub(crate) fn signature_type(&mut self, ty: &TypeSymbol) -> Result<SignatureType, EmitError> {
        Ok(match ty {
            TypeSymbol::Primitive(p) => primitive_signature(*p),
            TypeSymbol::Defined(key) => {
                let (value_type, token) = self.defined_type(key)?;
                class_or_value(value_type, token)
            }
            TypeSymbol::External(name) => {
                let (value_type, token) = self.external_type(name)?;
                class_or_value(value_type, token)
            }
            TypeSymbol::Generic { definition, args } => {
                let (value_type, definition) = self.generic_definition(definition)?;
                let args = args
                    .iter()
                    .map(|a| self.signature_type(a))
                    .collect::<Result<Vec<_>, _>>()?;
                SignatureType::GenericInst {
                    value_type,
                    definition,
                    args,
                }
            }
            TypeSymbol::Array(element) => SignatureType::SzArray(Box::new(self.signature_type(element)?)),
            TypeSymbol::TypeParam(n) => SignatureType::Var(*n),
            TypeSymbol::MethodTypeParam(n) => SignatureType::MVar(*n),
            TypeSymbol::Anonymous(shape) => SignatureType::Class(self.anonymous_type(shape)?.ty.token()),
            TypeSymbol::Delegate(shape) => SignatureType::Class(self.delegate_type(shape)?.ty.token()),
        })
    }

    pub(crate) fn signature_types(&mut self, types: &[TypeSymbol]) -> Result<Vec<SignatureType>, EmitError> {
        types.iter().map(|t| self.signature_type(t)).collect()
    }

    /// TypeDef, TypeRef or TypeSpec token of a type
    pub(crate) fn type_token(&mut self, ty: &TypeSymbol) -> Result<Token, EmitError> {
        match ty {
            TypeSymbol::Defined(key) => Ok(self.defined_type(key)?.1),
            TypeSymbol::External(name) => Ok(self.external_type(name)?.1),
            TypeSymbol::Anonymous(shape) => Ok(self.anonymous_type(shape)?.ty.token()),
            TypeSymbol::Delegate(shape) => Ok(self.delegate_type(shape)?.ty.token()),
            TypeSymbol::Generic { .. } | TypeSymbol::Array(_) => {
                let signature = self.signature_type(ty)?;
                self.type_spec(&signature)
            }
            other => Err(EmitError::invariant(format!("{other} has no type token"))),
        }
    }

    fn generic_definition(&mut self, definition: &TypeSymbol) -> Result<(bool, Token), EmitError> {
        match definition {
            TypeSymbol::Defined(key) => self.defined_type(key),
            TypeSymbol::External(name) => self.external_type(name),
            other => Err(EmitError::invariant(format!("{other} is not a generic type definition"))),
        }
    }

    pub(crate) fn defined_type(&mut self, key: &DeclKey) -> Result<(bool, Token), EmitError> {
        let detail = self
            .symbol(key)?
            .as_type()
            .ok_or_else(|| EmitError::invariant(format!("{key} is not a type")))?;
        if detail.embedded_interop {
            return Err(no_pia(key));
        }
        Ok((detail.kind == TypeKind::Struct, self.row_of(key)?.token()))
    }

    fn external_type(&mut self, name: &str) -> Result<(bool, Token), EmitError> {
        let compilation = self.compilation;
        let external = compilation
            .references()
            .get(name)
            .or_else(|| self.baseline.compilation().references().get(name));
        if external.is_some_and(|e| e.embedded_interop) {
            return Err(no_pia(name));
        }
        let value_type = external.is_some_and(|e| e.value_type);
        Ok((value_type, self.type_ref(name)?))
    }

    /// TypeRef of a referenced type, reusing earlier rows
    pub(crate) fn type_ref(&mut self, full_name: &str) -> Result<Token, EmitError> {
        let key = ReferenceKey::Type(full_name.to_owned());
        if let Some(token) = self.references.get(&key) {
            return Ok(*token);
        }
        let compilation = self.compilation;
        let assembly = compilation
            .references()
            .get(full_name)
            .map_or_else(|| self.options.core_assembly.clone(), |e| e.assembly.clone());
        let scope = self.assembly_ref(&assembly)?;
        let (namespace, name) = full_name.rsplit_once('.').unwrap_or(("", full_name));
        let handle = self.allocator.allocate(TableIndex::TypeRef)?;
        self.writer.update(
            handle,
            RowData::TypeRef {
                scope,
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            },
        )?;
        self.references.insert(key, handle.token());
        Ok(handle.token())
    }

    fn assembly_ref(&mut self, name: &str) -> Result<Token, EmitError> {
        let key = ReferenceKey::Assembly(name.to_owned());
        if let Some(token) = self.references.get(&key) {
            return Ok(*token);
        }
        let handle = self.allocator.allocate(TableIndex::AssemblyRef)?;
        self.writer.update(
            handle,
            RowData::AssemblyRef {
                name: name.to_owned(),
                version: [0; 4],
            },
        )?;
        self.references.insert(key, handle.token());
        Ok(handle.token())
    }

    fn type_spec(&mut self, signature: &SignatureType) -> Result<Token, EmitError> {
        let mut blob = BlobWriter::new();
        blob.write_type(signature)?;
        let bytes = blob.into_bytes();
        let key = ReferenceKey::TypeSpec(bytes.clone());
        if let Some(token) = self.references.get(&key) {
            return Ok(*token);
        }
        let handle = self.allocator.allocate(TableIndex::TypeSpec)?;
        self.writer.update(handle, RowData::TypeSpec { signature: bytes })?;
        self.references.insert(key, handle.token());
        Ok(handle.token())
    }

    /// MemberRef on `parent`, reusing earlier rows
    pub(crate) fn member_ref(&mut self, parent: Token, name: &str, signature: Vec<u8>) -> Result<Token, EmitError> {
        let key = ReferenceKey::Member {
            parent,
            name: name.to_owned(),
            signature: signature.clone(),
        };
        if let Some(token) = self.references.get(&key) {
            return Ok(*token);
        }
        let handle = self.allocator.allocate(TableIndex::MemberRef)?;
        self.writer.update(
            handle,
            RowData::MemberRef {
                parent,
                name: name.to_owned(),
                signature,
            },
        )?;
        self.references.insert(key, handle.token());
        Ok(handle.token())
    }

    /// MemberRef of a method on a referenced or instantiated type
    pub(crate) fn external_method_ref(
        &mut self,
        owner: &TypeSymbol,
        name: &str,
        params: &[TypeSymbol],
        return_type: &TypeSymbol,
        is_static: bool,
    ) -> Result<Token, EmitError> {
        let parent = self.type_token(owner)?;
        let params = self.signature_types(params)?;
        let return_type = self.signature_type(return_type)?;
        let signature = MethodSignature {
            has_this: !is_static,
            generic_arity: 0,
            return_type,
            params,
        }
        .encode()?;
        self.member_ref(parent, name, signature)
    }

    /// Constructor of a well-known type
    pub(crate) fn well_known_constructor(&mut self, ty: WellKnownType, params: &[TypeSymbol]) -> Result<Token, EmitError> {
        let target = self.resolver().resolve_constructor(ty, params)?;
        self.member_target_token(&target, None)
    }

    // ---- custom attributes ----

    /// Record the attributes `parent` should carry after this delta
    pub(crate) fn touch_attributes(&mut self, parent: Handle, desired: Vec<AttributeData>) {
        self.pending_attributes.insert(parent, desired);
    }

    /// Attributes `parent` carries so far in this delta
    pub(crate) fn current_attributes(&self, parent: Handle) -> Vec<AttributeData> {
        if let Some(pending) = self.pending_attributes.get(&parent) {
            return pending.clone();
        }
        self.attributes
            .get(&parent)
            .map(|rows| rows.iter().filter_map(|row| row.data.clone()).collect())
            .unwrap_or_default()
    }

    /// `[CompilerGenerated]` when the compilation can reference it
    pub(crate) fn compiler_generated_attribute(&self) -> Option<AttributeData> {
        self.well_known_attribute(WellKnownType::CompilerGeneratedAttribute)
    }

    pub(crate) fn well_known_attribute(&self, ty: WellKnownType) -> Option<AttributeData> {
        let resolver = self.resolver();
        resolver.resolve_constructor(ty, &[]).ok()?;
        resolver.resolve_type(ty).ok().map(AttributeData::simple)
    }

    /// `[MetadataUpdateDeleted]`, warning once when it cannot be resolved
    pub(crate) fn deleted_member_attribute(&mut self) -> Option<AttributeData> {
        if !self.options.emit_deleted_attribute {
            return None;
        }
        let attribute = self.well_known_attribute(WellKnownType::MetadataUpdateDeletedAttribute);
        if attribute.is_none() && !self.warned_deleted_attribute {
            tracing::warn!(
                attribute = WellKnownType::MetadataUpdateDeletedAttribute.full_name(),
                "deleted members are not marked: attribute is not available"
            );
            self.warned_deleted_attribute = true;
        }
        attribute
    }

    fn attribute_constructor(&mut self, data: &AttributeData) -> Result<Token, EmitError> {
        match &data.attribute_type {
            TypeSymbol::Defined(key) => {
                let ctor = DeclKey::method(key, ".ctor", 0, signature_string(&data.constructor_params));
                Ok(self.row_of(&ctor)?.token())
            }
            TypeSymbol::External(name) => {
                let (_, parent) = self.external_type(name)?;
                let params = self.signature_types(&data.constructor_params)?;
                let signature = MethodSignature::instance(SignatureType::Void, params).encode()?;
                self.member_ref(parent, ".ctor", signature)
            }
            other => Err(EmitError::invariant(format!("{other} cannot be an attribute type"))),
        }
    }

    fn reconcile_pending_attributes(&mut self) -> Result<(), EmitError> {
        let pending = std::mem::take(&mut self.pending_attributes);
        for (parent, desired) in pending {
            let existing: Vec<AttributeRow> = self
                .attributes
                .get(&parent)
                .map(|rows| rows.iter().cloned().collect())
                .unwrap_or_default();
            let allocator = &mut self.allocator;
            let result = reconcile_attributes(&existing, &desired, || allocator.allocate(TableIndex::CustomAttribute))?;
            for write in &result.writes {
                match write {
                    AttributeWrite::Assign { handle, data, .. } => {
                        let row = RowData::CustomAttribute {
                            parent: Some(parent.token()),
                            constructor: self.attribute_constructor(data)?,
                            value: encode_custom_attribute(&data.arguments)?,
                        };
                        self.writer.update(*handle, row)?;
                    }
                    AttributeWrite::Retire { handle, previous } => {
                        let row = RowData::CustomAttribute {
                            parent: None,
                            constructor: self.attribute_constructor(previous)?,
                            value: encode_custom_attribute(&previous.arguments)?,
                        };
                        self.writer.update(*handle, row)?;
                    }
                }
            }
            if !result.rows.is_empty() {
                self.attributes.insert(parent, result.rows.into_iter().collect());
            }
        }
        Ok(())
    }
}

fn class_or_value(value_type: bool, token: Token) -> SignatureType {
    if value_type {
        SignatureType::ValueType(token)
    } else {
        SignatureType::Class(token)
    }
}

fn no_pia(name: impl std::fmt::Display) -> EmitError {
    Diagnostic::new(
        DiagnosticCode::NoPiaEmbeddedType,
        format!("cannot use embedded interop type '{name}' in an edit"),
    )
    .with_symbol(name.to_string())
    .into()
}
