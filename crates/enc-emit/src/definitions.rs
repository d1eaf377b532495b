//! Definition rows
//!
//! Row allocation and row writing for inserted, updated, replaced and
//! reinserted declarations, plus the `define_*` helpers the synthesized
//! member pass builds its types with.
//!
//! Rows are allocated for a whole edit set before any row is written, so a
//! row written early may reference a declaration inserted later in the same
//! delta.

use crate::baseline::{BodyKey, DefinitionRecord, ReplacedType};
use crate::error::EmitError;
use crate::session::{DeltaSession, PendingBody};
use enc_metadata::{
    encode_field_signature, encode_property_signature, field_flags, method_flags, method_impl_flags, semantics,
    type_flags, Handle, MethodSignature, RowData, SignatureType, TableIndex, Token,
};
use enc_symbols::{
    Accessibility, DeclKey, DeclKind, MethodDetail, SymbolDef, SymbolDetail, SyntaxMap, TypeDetail, TypeKind,
};

/// Table holding the rows of a declaration kind
pub(crate) const fn table_of(kind: DeclKind) -> TableIndex {
    match kind {
        DeclKind::Type => TableIndex::TypeDef,
        DeclKind::Field => TableIndex::Field,
        DeclKind::Method => TableIndex::MethodDef,
        DeclKind::Property => TableIndex::Property,
        DeclKind::Event => TableIndex::Event,
        DeclKind::Parameter => TableIndex::Param,
        DeclKind::GenericParam => TableIndex::GenericParam,
    }
}

/// Whether `key` is declared somewhere inside `ancestor`
pub(crate) fn is_within(key: &DeclKey, ancestor: &DeclKey) -> bool {
    std::iter::successors(key.owner(), |k| k.owner()).any(|k| k == ancestor)
}

pub(crate) fn ordinal(index: usize) -> Result<u16, EmitError> {
    u16::try_from(index).map_err(|_| EmitError::invariant(format!("ordinal {index} exceeds the metadata limit")))
}

impl DeltaSession<'_> {
    // ---- allocation ----

    /// Reserve rows for an inserted declaration and everything it declares
    pub(crate) fn allocate_definition(&mut self, key: &DeclKey) -> Result<(), EmitError> {
        if self.is_new(key) {
            return Ok(());
        }
        let symbol = self.symbol(key)?;
        self.allocate_row(key)?;
        match &symbol.detail {
            SymbolDetail::Type(detail) => {
                self.allocate_generic_params(key, &detail.generic_params)?;
                let compilation = self.compilation;
                for member in compilation.members_of(key) {
                    if !self.definitions.contains_key(&member.key) {
                        self.allocate_definition(&member.key)?;
                    }
                }
            }
            SymbolDetail::Method(detail) => {
                for sequence in 1..=detail.params.len() {
                    self.allocate_row(&DeclKey::parameter(key, ordinal(sequence)?))?;
                }
                self.allocate_generic_params(key, &detail.generic_params)?;
            }
            SymbolDetail::Property(_) | SymbolDetail::Event(_) => {
                for accessor in symbol.accessors() {
                    if !self.definitions.contains_key(accessor) {
                        self.allocate_definition(accessor)?;
                    }
                }
            }
            SymbolDetail::Field(_) => {}
        }
        Ok(())
    }

    /// Retire the current row of a type and reserve a fresh one
    pub(crate) fn allocate_replacement(&mut self, key: &DeclKey, previous: Handle) -> Result<(), EmitError> {
        let stale: Vec<DeclKey> = self
            .definitions
            .keys()
            .filter(|k| is_within(k, key))
            .cloned()
            .collect();
        for k in &stale {
            self.definitions.remove(k);
            self.deleted.remove(k);
        }
        let stale_bodies: Vec<BodyKey> = self
            .locals
            .keys()
            .filter(|body| match body {
                BodyKey::Member(m) | BodyKey::Lambda { method: m, .. } => is_within(m, key),
            })
            .cloned()
            .collect();
        for body in &stale_bodies {
            self.locals.remove(body);
        }
        self.definitions.remove(key);
        self.deleted.remove(key);
        self.replaced_types.entry(key.clone()).or_default().push_back(ReplacedType {
            handle: previous,
            generation: self.generation,
        });
        tracing::debug!(symbol = %key, previous = %previous, "replacing type");
        self.allocate_definition(key)
    }

    fn allocate_row(&mut self, key: &DeclKey) -> Result<Handle, EmitError> {
        let handle = self.allocator.allocate(table_of(key.kind()))?;
        self.definitions.insert(
            key.clone(),
            DefinitionRecord {
                handle,
                generation: self.generation,
            },
        );
        Ok(handle)
    }

    fn allocate_generic_params(&mut self, owner: &DeclKey, names: &[String]) -> Result<(), EmitError> {
        for (i, name) in names.iter().enumerate() {
            self.allocate_row(&DeclKey::generic_param(owner, ordinal(i)?, name.as_str()))?;
        }
        Ok(())
    }

    /// Whether the declaration's row was allocated by this delta
    pub(crate) fn is_new(&self, key: &DeclKey) -> bool {
        self.definitions
            .get(key)
            .is_some_and(|r| r.generation == self.generation)
    }

    // ---- writing ----

    /// Write the rows of an inserted declaration
    pub(crate) fn write_definition(&mut self, key: &DeclKey) -> Result<(), EmitError> {
        if !self.written.insert(key.clone()) {
            return Ok(());
        }
        let symbol = self.symbol(key)?;
        let handle = self.row_of(key)?;
        let row = self.definition_row(symbol)?;
        match &symbol.detail {
            SymbolDetail::Type(detail) => {
                self.writer.update(handle, row)?;
                if let Some(enclosing) = key.owner() {
                    let enclosing = self.row_of(enclosing)?;
                    self.nested_class(handle, enclosing)?;
                }
                self.write_generic_params(key, handle, &detail.generic_params)?;
                let compilation = self.compilation;
                for member in compilation.members_of(key) {
                    if self.is_new(&member.key) {
                        self.write_definition(&member.key)?;
                    }
                }
            }
            SymbolDetail::Field(_) => {
                let owner = self.owner_row(key)?;
                self.writer.add(owner, handle, row)?;
            }
            SymbolDetail::Method(detail) => {
                let owner = self.owner_row(key)?;
                self.writer.add(owner, handle, row)?;
                self.write_params(key, handle, detail, None)?;
                self.write_generic_params(key, handle, &detail.generic_params)?;
                if detail.has_body() {
                    self.queue_body(key, handle, None);
                }
            }
            SymbolDetail::Property(property) => {
                let map = self.property_map_row(self.owner_key(key)?)?;
                self.writer.add(map, handle, row)?;
                for (accessor, flag) in [(&property.getter, semantics::GETTER), (&property.setter, semantics::SETTER)] {
                    if let Some(accessor) = accessor {
                        self.write_semantics(accessor, handle, flag)?;
                    }
                }
            }
            SymbolDetail::Event(event) => {
                let map = self.event_map_row(self.owner_key(key)?)?;
                self.writer.add(map, handle, row)?;
                for (accessor, flag) in [(&event.adder, semantics::ADD_ON), (&event.remover, semantics::REMOVE_ON)] {
                    if let Some(accessor) = accessor {
                        self.write_semantics(accessor, handle, flag)?;
                    }
                }
            }
        }
        self.touch_attributes(handle, symbol.attributes.clone());
        Ok(())
    }

    /// Re-emit the row of an updated declaration in place
    pub(crate) fn rewrite_definition(
        &mut self,
        old: &DeclKey,
        new: &DeclKey,
        handle: Handle,
        syntax_map: Option<SyntaxMap>,
    ) -> Result<(), EmitError> {
        if old != new {
            self.rekey(old, new);
        }
        if !self.written.insert(new.clone()) {
            return Ok(());
        }
        let symbol = self.symbol(new)?;
        let row = self.definition_row(symbol)?;
        self.writer.update(handle, row)?;
        if let SymbolDetail::Method(detail) = &symbol.detail {
            let baseline = self.baseline;
            let previous = baseline.compilation().get(old).and_then(SymbolDef::as_method);
            self.write_params(new, handle, detail, previous)?;
            if detail.has_body() {
                self.queue_body(new, handle, syntax_map);
            }
        }
        self.touch_attributes(handle, symbol.attributes.clone());
        Ok(())
    }

    /// Bring a deleted declaration back on its original row
    pub(crate) fn reinsert(&mut self, key: &DeclKey, handle: Handle) -> Result<(), EmitError> {
        if !self.written.insert(key.clone()) {
            return Ok(());
        }
        self.deleted.remove(key);
        let symbol = self.symbol(key)?;
        let row = self.definition_row(symbol)?;
        self.writer.update(handle, row)?;
        match &symbol.detail {
            SymbolDetail::Method(detail) => {
                self.write_params(key, handle, detail, None)?;
                if detail.has_body() {
                    self.queue_body(key, handle, None);
                }
            }
            SymbolDetail::Type(_) => {
                let compilation = self.compilation;
                for member in compilation.descendants(key) {
                    if self.deleted.contains_key(&member.key) {
                        let row = self.row_of(&member.key)?;
                        self.reinsert(&member.key, row)?;
                    }
                }
            }
            SymbolDetail::Property(_) | SymbolDetail::Event(_) => {
                for accessor in symbol.accessors() {
                    if self.deleted.contains_key(accessor) {
                        let row = self.row_of(accessor)?;
                        self.reinsert(accessor, row)?;
                    }
                }
            }
            SymbolDetail::Field(_) => {}
        }
        tracing::debug!(symbol = %key, row = %handle, "reinserted on original row");
        self.touch_attributes(handle, symbol.attributes.clone());
        Ok(())
    }

    fn queue_body(&mut self, key: &DeclKey, handle: Handle, syntax_map: Option<SyntaxMap>) {
        self.pending_bodies.push(PendingBody {
            key: key.clone(),
            handle,
            syntax_map,
        });
    }

    /// Move the bookkeeping of a declaration whose key changed
    fn rekey(&mut self, old: &DeclKey, new: &DeclKey) {
        if let Some(record) = self.definitions.remove(old) {
            self.definitions.insert(new.clone(), record);
        }
        let children: Vec<(DeclKey, DefinitionRecord)> = self
            .definitions
            .iter()
            .filter(|(k, _)| k.owner() == Some(old))
            .map(|(k, r)| (k.clone(), *r))
            .collect();
        for (key, record) in children {
            let moved = match &key {
                DeclKey::Parameter { sequence, .. } => DeclKey::parameter(new, *sequence),
                DeclKey::GenericParam { ordinal, name, .. } => DeclKey::generic_param(new, *ordinal, name.as_str()),
                _ => continue,
            };
            self.definitions.remove(&key);
            self.definitions.insert(moved, record);
        }
        if let Some(slots) = self.locals.remove(&BodyKey::Member(old.clone())) {
            self.locals.insert(BodyKey::Member(new.clone()), slots);
        }
        self.synthesized.rekey_method(old, new);
    }

    fn write_params(
        &mut self,
        method: &DeclKey,
        method_row: Handle,
        detail: &MethodDetail,
        previous: Option<&MethodDetail>,
    ) -> Result<(), EmitError> {
        for (i, param) in detail.params.iter().enumerate() {
            let sequence = ordinal(i + 1)?;
            let key = DeclKey::parameter(method, sequence);
            let row = RowData::Param {
                flags: 0,
                sequence,
                name: param.name.clone(),
            };
            let handle = match self.definitions.get(&key).copied() {
                Some(record) if record.generation < self.generation => {
                    let unchanged = previous
                        .and_then(|p| p.params.get(i))
                        .is_some_and(|old| old.name == param.name && old.attributes == param.attributes);
                    if unchanged {
                        continue;
                    }
                    self.writer.update(record.handle, row)?;
                    record.handle
                }
                Some(record) => {
                    self.writer.add(method_row, record.handle, row)?;
                    record.handle
                }
                None => {
                    let handle = self.allocate_row(&key)?;
                    self.writer.add(method_row, handle, row)?;
                    handle
                }
            };
            self.touch_attributes(handle, param.attributes.clone());
        }
        Ok(())
    }

    fn write_generic_params(&mut self, owner: &DeclKey, owner_row: Handle, names: &[String]) -> Result<(), EmitError> {
        for (i, name) in names.iter().enumerate() {
            let number = ordinal(i)?;
            let key = DeclKey::generic_param(owner, number, name.as_str());
            if !self.is_new(&key) {
                continue;
            }
            let handle = self.row_of(&key)?;
            self.writer.update(
                handle,
                RowData::GenericParam {
                    number,
                    flags: 0,
                    owner: owner_row.token(),
                    name: name.clone(),
                },
            )?;
        }
        Ok(())
    }

    fn write_semantics(&mut self, accessor: &DeclKey, association: Handle, flag: u16) -> Result<(), EmitError> {
        if self.is_new(accessor) {
            self.write_definition(accessor)?;
        }
        let method = self.row_of(accessor)?.token();
        self.method_semantics(method, association.token(), flag)
    }

    pub(crate) fn method_semantics(&mut self, method: Token, association: Token, flag: u16) -> Result<(), EmitError> {
        let handle = self.allocator.allocate(TableIndex::MethodSemantics)?;
        self.writer.update(
            handle,
            RowData::MethodSemantics {
                semantics: flag,
                method,
                association,
            },
        )
    }

    fn nested_class(&mut self, nested: Handle, enclosing: Handle) -> Result<(), EmitError> {
        let handle = self.allocator.allocate(TableIndex::NestedClass)?;
        self.writer.update(
            handle,
            RowData::NestedClass {
                nested: nested.token(),
                enclosing: enclosing.token(),
            },
        )
    }

    fn owner_key<'k>(&self, key: &'k DeclKey) -> Result<&'k DeclKey, EmitError> {
        key.owner()
            .ok_or_else(|| EmitError::invariant(format!("{key} has no declaring type")))
    }

    fn owner_row(&self, key: &DeclKey) -> Result<Handle, EmitError> {
        self.row_of(self.owner_key(key)?)
    }

    /// PropertyMap row of a type, created on first use
    pub(crate) fn property_map_row(&mut self, ty: &DeclKey) -> Result<Handle, EmitError> {
        if let Some(handle) = self.property_maps.get(ty) {
            return Ok(*handle);
        }
        let parent = self.row_of(ty)?;
        let handle = self.property_map_for(parent)?;
        self.property_maps.insert(ty.clone(), handle);
        Ok(handle)
    }

    pub(crate) fn property_map_for(&mut self, parent: Handle) -> Result<Handle, EmitError> {
        let handle = self.allocator.allocate(TableIndex::PropertyMap)?;
        self.writer.update(handle, RowData::PropertyMap { parent: parent.token() })?;
        Ok(handle)
    }

    /// EventMap row of a type, created on first use
    fn event_map_row(&mut self, ty: &DeclKey) -> Result<Handle, EmitError> {
        if let Some(handle) = self.event_maps.get(ty) {
            return Ok(*handle);
        }
        let parent = self.row_of(ty)?.token();
        let handle = self.allocator.allocate(TableIndex::EventMap)?;
        self.writer.update(handle, RowData::EventMap { parent })?;
        self.event_maps.insert(ty.clone(), handle);
        Ok(handle)
    }

    // ---- row contents ----

    /// Row of a declaration as it reads in the new program
    pub(crate) fn definition_row(&mut self, symbol: &SymbolDef) -> Result<RowData, EmitError> {
        let key = &symbol.key;
        Ok(match &symbol.detail {
            SymbolDetail::Type(detail) => RowData::TypeDef {
                flags: type_def_flags(symbol, detail),
                namespace: if key.owner().is_none() {
                    key.namespace().to_owned()
                } else {
                    String::new()
                },
                name: self.type_name(key),
                extends: self.base_type(detail)?,
            },
            SymbolDetail::Field(field) => {
                let ty = self.signature_type(&field.ty)?;
                let mut flags = field_access(symbol.accessibility);
                if field.is_static {
                    flags |= field_flags::STATIC;
                }
                if field.is_readonly {
                    flags |= field_flags::INIT_ONLY;
                }
                RowData::Field {
                    flags,
                    name: key.name().to_owned(),
                    signature: encode_field_signature(&ty)?,
                }
            }
            SymbolDetail::Method(method) => RowData::MethodDef {
                rva: None,
                impl_flags: method_impl_flags::IL,
                flags: method_def_flags(symbol, method),
                name: key.metadata_name(),
                signature: self.method_signature(method)?,
            },
            SymbolDetail::Property(property) => {
                let ty = self.signature_type(&property.ty)?;
                let params = self.signature_types(&property.params)?;
                RowData::Property {
                    flags: 0,
                    name: key.name().to_owned(),
                    signature: encode_property_signature(!property.is_static, &ty, &params)?,
                }
            }
            SymbolDetail::Event(event) => RowData::Event {
                flags: 0,
                name: key.name().to_owned(),
                event_type: self.type_token(&event.ty)?,
            },
        })
    }

    /// Metadata name of a type; replaced types carry the generation that
    /// created their current row
    fn type_name(&self, key: &DeclKey) -> String {
        let name = key.metadata_name();
        match self.replaced_types.get(key).and_then(|history| history.last()) {
            Some(replaced) => format!("{name}#{}", replaced.generation),
            None => name,
        }
    }

    fn base_type(&mut self, detail: &TypeDetail) -> Result<Option<Token>, EmitError> {
        if detail.kind == TypeKind::Interface {
            return Ok(None);
        }
        match &detail.base {
            Some(base) => Ok(Some(self.type_token(base)?)),
            None if detail.kind == TypeKind::Struct => Ok(Some(self.type_ref("System.ValueType")?)),
            None => Ok(Some(self.type_ref("System.Object")?)),
        }
    }

    pub(crate) fn method_signature(&mut self, method: &MethodDetail) -> Result<Vec<u8>, EmitError> {
        let return_type = self.signature_type(&method.return_type)?;
        let params = self.signature_types(&method.param_types())?;
        let generic_arity = u32::try_from(method.generic_params.len())
            .map_err(|_| EmitError::invariant("generic arity exceeds the metadata limit"))?;
        Ok(MethodSignature {
            has_this: !method.is_static,
            generic_arity,
            return_type,
            params,
        }
        .encode()?)
    }

    // ---- synthesized definitions ----

    /// New TypeDef row, nested in `enclosing` when given
    pub(crate) fn define_type(
        &mut self,
        namespace: &str,
        name: String,
        flags: u32,
        extends: Option<Token>,
        enclosing: Option<Handle>,
    ) -> Result<Handle, EmitError> {
        let handle = self.allocator.allocate(TableIndex::TypeDef)?;
        self.writer.update(
            handle,
            RowData::TypeDef {
                flags,
                namespace: namespace.to_owned(),
                name,
                extends,
            },
        )?;
        if let Some(enclosing) = enclosing {
            self.nested_class(handle, enclosing)?;
        }
        Ok(handle)
    }

    /// New Field row added to `owner`
    pub(crate) fn define_field(
        &mut self,
        owner: Handle,
        name: String,
        flags: u16,
        ty: &SignatureType,
    ) -> Result<Handle, EmitError> {
        let handle = self.allocator.allocate(TableIndex::Field)?;
        self.writer.add(
            owner,
            handle,
            RowData::Field {
                flags,
                name,
                signature: encode_field_signature(ty)?,
            },
        )?;
        Ok(handle)
    }

    /// New MethodDef row added to `owner`; its body is attached separately
    pub(crate) fn define_method(
        &mut self,
        owner: Handle,
        name: String,
        flags: u16,
        impl_flags: u16,
        signature: &MethodSignature,
    ) -> Result<Handle, EmitError> {
        let handle = self.allocator.allocate(TableIndex::MethodDef)?;
        self.writer.add(
            owner,
            handle,
            RowData::MethodDef {
                rva: None,
                impl_flags,
                flags,
                name,
                signature: signature.encode()?,
            },
        )?;
        Ok(handle)
    }

    /// Param rows for `names`, sequences starting at 1
    pub(crate) fn define_params(&mut self, method: Handle, names: &[&str]) -> Result<(), EmitError> {
        for (i, name) in names.iter().enumerate() {
            let handle = self.allocator.allocate(TableIndex::Param)?;
            self.writer.add(
                method,
                handle,
                RowData::Param {
                    flags: 0,
                    sequence: ordinal(i + 1)?,
                    name: (*name).to_owned(),
                },
            )?;
        }
        Ok(())
    }
}

fn type_def_flags(symbol: &SymbolDef, detail: &TypeDetail) -> u32 {
    let mut flags = if symbol.key.owner().is_some() {
        match symbol.accessibility {
            Accessibility::Public => type_flags::NESTED_PUBLIC,
            Accessibility::Protected => type_flags::NESTED_FAMILY,
            Accessibility::Internal => type_flags::NESTED_ASSEMBLY,
            Accessibility::Private => type_flags::NESTED_PRIVATE,
        }
    } else if symbol.accessibility == Accessibility::Public {
        type_flags::PUBLIC
    } else {
        0
    };
    if detail.kind == TypeKind::Interface {
        flags |= type_flags::INTERFACE | type_flags::ABSTRACT;
    }
    if detail.is_abstract {
        flags |= type_flags::ABSTRACT;
    }
    if detail.is_sealed || detail.kind == TypeKind::Struct {
        flags |= type_flags::SEALED;
    }
    flags
}

const fn field_access(accessibility: Accessibility) -> u16 {
    match accessibility {
        Accessibility::Public => field_flags::PUBLIC,
        Accessibility::Protected => field_flags::FAMILY,
        Accessibility::Internal => field_flags::ASSEMBLY,
        Accessibility::Private => field_flags::PRIVATE,
    }
}

const fn method_access(accessibility: Accessibility) -> u16 {
    match accessibility {
        Accessibility::Public => method_flags::PUBLIC,
        Accessibility::Protected => method_flags::FAMILY,
        Accessibility::Internal => method_flags::ASSEMBLY,
        Accessibility::Private => method_flags::PRIVATE,
    }
}

fn method_def_flags(symbol: &SymbolDef, method: &MethodDetail) -> u16 {
    let mut flags = method_access(symbol.accessibility) | method_flags::HIDE_BY_SIG;
    if method.is_static {
        flags |= method_flags::STATIC;
    }
    if method.is_virtual || method.is_abstract {
        flags |= method_flags::VIRTUAL | method_flags::NEW_SLOT;
    }
    if method.is_abstract {
        flags |= method_flags::ABSTRACT;
    }
    if method.is_special_name {
        flags |= method_flags::SPECIAL_NAME;
    }
    if matches!(symbol.key.name(), ".ctor" | ".cctor") {
        flags |= method_flags::SPECIAL_NAME | method_flags::RT_SPECIAL_NAME;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use enc_symbols::{FieldDetail, TypeSymbol};

    fn c() -> DeclKey {
        DeclKey::top_level("N", "C", 0)
    }

    #[test]
    fn nested_members_are_within_their_types() {
        let nested = DeclKey::nested(&c(), "D", 1);
        let method = DeclKey::method(&nested, "F", 0, "()");
        assert!(is_within(&method, &c()));
        assert!(is_within(&DeclKey::parameter(&method, 1), &nested));
        assert!(!is_within(&c(), &c()));
    }

    #[test]
    fn nested_type_flags_follow_accessibility() {
        let nested = SymbolDef::new(DeclKey::nested(&c(), "D", 0), SymbolDetail::Type(TypeDetail::default()))
            .with_accessibility(Accessibility::Protected);
        let detail = nested.as_type().cloned().unwrap_or_default();
        assert_eq!(type_def_flags(&nested, &detail), type_flags::NESTED_FAMILY);

        let interface = TypeDetail {
            kind: TypeKind::Interface,
            ..TypeDetail::default()
        };
        let top = SymbolDef::new(c(), SymbolDetail::Type(interface.clone())).with_accessibility(Accessibility::Public);
        assert_eq!(
            type_def_flags(&top, &interface),
            type_flags::PUBLIC | type_flags::INTERFACE | type_flags::ABSTRACT
        );
    }

    #[test]
    fn constructors_are_runtime_special() {
        let detail = MethodDetail {
            params: Vec::new(),
            return_type: TypeSymbol::VOID,
            generic_params: Vec::new(),
            is_static: false,
            is_virtual: false,
            is_abstract: false,
            is_special_name: false,
        };
        let ctor = SymbolDef::new(DeclKey::method(&c(), ".ctor", 0, "()"), SymbolDetail::Method(detail.clone()))
            .with_accessibility(Accessibility::Public);
        let flags = method_def_flags(&ctor, &detail);
        assert_eq!(flags & method_flags::RT_SPECIAL_NAME, method_flags::RT_SPECIAL_NAME);
        assert_eq!(flags & 0x7, method_flags::PUBLIC);
    }

    #[test]
    fn declaration_kinds_map_to_tables() {
        let field = SymbolDef::new(
            DeclKey::field(&c(), "x"),
            SymbolDetail::Field(FieldDetail {
                ty: TypeSymbol::INT32,
                is_static: false,
                is_readonly: false,
            }),
        );
        assert_eq!(table_of(field.key.kind()), TableIndex::Field);
        let property = DeclKey::property(&c(), "P", "()");
        assert_eq!(table_of(property.kind()), TableIndex::Property);
        assert_eq!(ordinal(3).unwrap(), 3);
        assert!(ordinal(usize::from(u16::MAX) + 1).is_err());
    }
}
