//! Generation baseline
//!
//! Provides [`Baseline`], the immutable snapshot a delta is computed against,
//! and [`ModuleMetadata`], the generation-0 layout a full compile hands over.
//!
//! # Persistence
//!
//! Every map is an `im` persistent structure: deriving the next baseline
//! clones in constant time and shares all untouched entries, so older
//! baselines remain valid values.

use crate::allocator::ReferenceKey;
use crate::attributes::AttributeRow;
use crate::debug_info::DebugInfoProvider;
use crate::error::EmitError;
use crate::locals::LocalSlotMap;
use crate::synthesized::{
    AnonymousTypeRecord, ClosureRecord, ContainerRecord, DelegateRecord, LambdaRecord, SynthesizedState,
};
use enc_metadata::{Handle, TableIndex, TableSizes, Token};
use enc_symbols::{AnonymousTypeShape, AttributeData, DeclKey, DelegateShape, SymbolTable};
use im::{OrdMap, Vector};
use std::sync::Arc;
use uuid::Uuid;

/// Row of a declaration and the generation that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefinitionRecord {
    pub handle: Handle,
    pub generation: u32,
}

/// Member deleted while its row stays in metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedMemberRecord {
    /// Token the member had and keeps
    pub token: Token,
    /// Whether its body was replaced by a throwing stub
    pub stub_body_generated: bool,
    /// Generation of the deletion
    pub generation: u32,
}

/// Identity of a method body with a local slot map
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BodyKey {
    /// Body of a declared method
    Member(DeclKey),
    /// Body of lambda `ordinal` of a method
    Lambda { method: DeclKey, ordinal: u32 },
}

/// Earlier row of a type that was replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacedType {
    pub handle: Handle,
    /// Generation that retired the row
    pub generation: u32,
}

/// Metadata layout of a fully compiled module (generation 0)
#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub module_version_id: Uuid,
    pub table_sizes: TableSizes,
    pub user_string_size: u32,
    pub definitions: Vec<(DeclKey, Handle)>,
    /// `(parent, attribute row, data)`
    pub attributes: Vec<(Handle, Handle, AttributeData)>,
    pub property_maps: Vec<(DeclKey, Handle)>,
    pub event_maps: Vec<(DeclKey, Handle)>,
    pub references: Vec<(ReferenceKey, Token)>,
    /// Lambdas, closures and synthesized types the full compile emitted
    pub synthesized: SynthesizedState,
}

impl ModuleMetadata {
    #[must_use]
    pub fn builder() -> ModuleMetadataBuilder {
        ModuleMetadataBuilder::default()
    }
}

/// Builder for [`ModuleMetadata`]
///
/// Table sizes default to the highest row mentioned for each table.
#[derive(Debug, Clone, Default)]
pub struct ModuleMetadataBuilder {
    module_version_id: Option<Uuid>,
    table_sizes: TableSizes,
    user_string_size: u32,
    definitions: Vec<(DeclKey, Handle)>,
    attributes: Vec<(Handle, Handle, AttributeData)>,
    property_maps: Vec<(DeclKey, Handle)>,
    event_maps: Vec<(DeclKey, Handle)>,
    references: Vec<(ReferenceKey, Token)>,
    synthesized: SynthesizedState,
}

impl ModuleMetadataBuilder {
    fn observe(&mut self, handle: Handle) {
        if handle.row() > self.table_sizes.get(handle.table()) {
            self.table_sizes.set(handle.table(), handle.row());
        }
    }

    pub fn module_version_id(&mut self, id: Uuid) -> &mut Self {
        self.module_version_id = Some(id);
        self
    }

    pub fn definition(&mut self, key: DeclKey, handle: Handle) -> &mut Self {
        self.observe(handle);
        self.definitions.push((key, handle));
        self
    }

    pub fn attribute(&mut self, parent: Handle, row: Handle, data: AttributeData) -> &mut Self {
        self.observe(row);
        self.attributes.push((parent, row, data));
        self
    }

    pub fn property_map(&mut self, ty: DeclKey, handle: Handle) -> &mut Self {
        self.observe(handle);
        self.property_maps.push((ty, handle));
        self
    }

    pub fn event_map(&mut self, ty: DeclKey, handle: Handle) -> &mut Self {
        self.observe(handle);
        self.event_maps.push((ty, handle));
        self
    }

    pub fn reference(&mut self, key: ReferenceKey, token: Token) -> &mut Self {
        if let Some(handle) = token.handle() {
            self.observe(handle);
        }
        self.references.push((key, token));
        self
    }

    /// Lambda `record.ordinal` of `method`; lambdas are given in ordinal order
    pub fn lambda(&mut self, method: DeclKey, record: LambdaRecord) -> &mut Self {
        self.observe(record.method);
        if let Some(cache) = record.cache_field {
            self.observe(cache);
        }
        self.synthesized.lambdas.entry(method).or_default().push_back(record);
        self
    }

    /// Display class `record.ordinal` of `method`
    pub fn closure(&mut self, method: DeclKey, record: ClosureRecord) -> &mut Self {
        self.observe(record.ty);
        self.observe(record.ctor);
        for field in &record.fields {
            self.observe(field.handle);
        }
        self.synthesized.closures.entry(method).or_default().push_back(record);
        self
    }

    /// `<>c` container nested in `ty`
    pub fn lambda_container(&mut self, ty: DeclKey, record: ContainerRecord) -> &mut Self {
        for handle in [record.ty, record.instance, record.ctor, record.cctor] {
            self.observe(handle);
        }
        self.synthesized.containers.insert(ty, record);
        self
    }

    pub fn anonymous_type(&mut self, shape: &AnonymousTypeShape, record: AnonymousTypeRecord) -> &mut Self {
        self.observe(record.ty);
        self.observe(record.ctor);
        for (_, getter) in &record.getters {
            self.observe(*getter);
        }
        self.synthesized.anonymous_types.insert(shape.key(), record);
        self
    }

    pub fn delegate(&mut self, shape: &DelegateShape, record: DelegateRecord) -> &mut Self {
        for handle in [record.ty, record.ctor, record.invoke] {
            self.observe(handle);
        }
        self.synthesized.delegates.insert(shape.key(), record);
        self
    }

    /// Constructor of a `HotReloadException` the module already defines
    pub fn hot_reload_exception(&mut self, ctor: Token) -> &mut Self {
        if let Some(handle) = ctor.handle() {
            self.observe(handle);
        }
        self.synthesized.hot_reload_exception = Some(ctor);
        self
    }

    /// Row count of a table; never lowers a count implied by added rows
    pub fn table_rows(&mut self, table: TableIndex, rows: u32) -> &mut Self {
        if rows > self.table_sizes.get(table) {
            self.table_sizes.set(table, rows);
        }
        self
    }

    pub fn user_strings(&mut self, size: u32) -> &mut Self {
        self.user_string_size = size;
        self
    }

    #[must_use]
    pub fn build(self) -> ModuleMetadata {
        ModuleMetadata {
            module_version_id: self.module_version_id.unwrap_or_else(Uuid::new_v4),
            table_sizes: self.table_sizes,
            user_string_size: self.user_string_size,
            definitions: self.definitions,
            attributes: self.attributes,
            property_maps: self.property_maps,
            event_maps: self.event_maps,
            references: self.references,
            synthesized: self.synthesized,
        }
    }
}

/// Immutable snapshot of a module's metadata and synthesis history
#[derive(Debug, Clone)]
pub struct Baseline {
    pub(crate) generation: u32,
    pub(crate) module_version_id: Uuid,
    pub(crate) enc_id: Uuid,
    pub(crate) compilation: Arc<SymbolTable>,
    pub(crate) debug_info: Arc<dyn DebugInfoProvider>,
    pub(crate) table_sizes: TableSizes,
    pub(crate) user_string_size: u32,
    pub(crate) definitions: OrdMap<DeclKey, DefinitionRecord>,
    pub(crate) deleted: OrdMap<DeclKey, DeletedMemberRecord>,
    pub(crate) attributes: OrdMap<Handle, Vector<AttributeRow>>,
    pub(crate) property_maps: OrdMap<DeclKey, Handle>,
    pub(crate) event_maps: OrdMap<DeclKey, Handle>,
    pub(crate) references: OrdMap<ReferenceKey, Token>,
    pub(crate) locals: OrdMap<BodyKey, Arc<LocalSlotMap>>,
    pub(crate) synthesized: SynthesizedState,
    pub(crate) replaced_types: OrdMap<DeclKey, Vector<ReplacedType>>,
}

impl Baseline {
    /// Baseline of a fully compiled module
    ///
    /// # Errors
    /// Returns error if a recorded row lies beyond its table's row count, two
    /// declarations share a row or a synthesized row collides with a
    /// declaration
    pub fn initial(
        metadata: ModuleMetadata,
        compilation: Arc<SymbolTable>,
        debug_info: Arc<dyn DebugInfoProvider>,
    ) -> Result<Self, EmitError> {
        let sizes = metadata.table_sizes;
        let check = |handle: Handle| {
            if handle.row() == 0 || handle.row() > sizes.get(handle.table()) {
                Err(EmitError::invariant(format!("row {handle} lies outside its table")))
            } else {
                Ok(())
            }
        };

        let mut definitions = OrdMap::new();
        let mut owners: OrdMap<Handle, DeclKey> = OrdMap::new();
        for (key, handle) in metadata.definitions {
            check(handle)?;
            if let Some(other) = owners.insert(handle, key.clone()) {
                return Err(EmitError::invariant(format!("{other} and {key} share row {handle}")));
            }
            definitions.insert(key, DefinitionRecord { handle, generation: 0 });
        }

        let mut attributes: OrdMap<Handle, Vector<AttributeRow>> = OrdMap::new();
        for (parent, row, data) in metadata.attributes {
            check(row)?;
            attributes.entry(parent).or_default().push_back(AttributeRow::live(row, data));
        }

        for handle in metadata.synthesized.rows() {
            check(handle)?;
            if let Some(key) = owners.get(&handle) {
                return Err(EmitError::invariant(format!("synthesized row {handle} belongs to {key}")));
            }
        }

        Ok(Self {
            generation: 0,
            module_version_id: metadata.module_version_id,
            enc_id: Uuid::nil(),
            compilation,
            debug_info,
            table_sizes: sizes,
            user_string_size: metadata.user_string_size,
            definitions,
            deleted: OrdMap::new(),
            attributes,
            property_maps: metadata.property_maps.into_iter().collect(),
            event_maps: metadata.event_maps.into_iter().collect(),
            references: metadata.references.into_iter().collect(),
            locals: OrdMap::new(),
            synthesized: metadata.synthesized,
            replaced_types: OrdMap::new(),
        })
    }

    /// Generation ordinal; 0 for a full compile
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    #[must_use]
    pub const fn module_version_id(&self) -> Uuid {
        self.module_version_id
    }

    /// Id of the delta that produced this baseline; nil for generation 0
    #[inline]
    #[must_use]
    pub const fn enc_id(&self) -> Uuid {
        self.enc_id
    }

    /// Program version this baseline was produced from
    #[inline]
    #[must_use]
    pub fn compilation(&self) -> &Arc<SymbolTable> {
        &self.compilation
    }

    #[inline]
    #[must_use]
    pub fn debug_info(&self) -> &Arc<dyn DebugInfoProvider> {
        &self.debug_info
    }

    /// Highest allocated row per table
    #[inline]
    #[must_use]
    pub const fn table_sizes(&self) -> TableSizes {
        self.table_sizes
    }

    /// Aggregated user-string heap size
    #[inline]
    #[must_use]
    pub const fn user_string_size(&self) -> u32 {
        self.user_string_size
    }

    #[must_use]
    pub fn definition(&self, key: &DeclKey) -> Option<DefinitionRecord> {
        self.definitions.get(key).copied()
    }

    /// Token of a declaration
    #[must_use]
    pub fn token_of(&self, key: &DeclKey) -> Option<Token> {
        self.definitions.get(key).map(|r| r.handle.token())
    }

    /// Declarations with rows, in key order
    pub fn definitions(&self) -> impl Iterator<Item = (&DeclKey, &DefinitionRecord)> {
        self.definitions.iter()
    }

    #[must_use]
    pub fn deleted_member(&self, key: &DeclKey) -> Option<DeletedMemberRecord> {
        self.deleted.get(key).copied()
    }

    #[must_use]
    pub fn is_deleted(&self, key: &DeclKey) -> bool {
        self.deleted.contains_key(key)
    }

    /// CustomAttribute rows reserved for a parent, in row order
    #[must_use]
    pub fn attribute_rows(&self, parent: Handle) -> Vec<AttributeRow> {
        self.attributes
            .get(&parent)
            .map(|rows| rows.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn property_map(&self, ty: &DeclKey) -> Option<Handle> {
        self.property_maps.get(ty).copied()
    }

    #[must_use]
    pub fn event_map(&self, ty: &DeclKey) -> Option<Handle> {
        self.event_maps.get(ty).copied()
    }

    /// Reference row (AssemblyRef, TypeRef, MemberRef, TypeSpec) emitted so far
    #[must_use]
    pub fn reference(&self, key: &ReferenceKey) -> Option<Token> {
        self.references.get(key).copied()
    }

    /// Slot map recorded for a body emitted by an earlier delta
    #[must_use]
    pub fn local_slots(&self, body: &BodyKey) -> Option<Arc<LocalSlotMap>> {
        self.locals.get(body).cloned()
    }

    #[inline]
    #[must_use]
    pub fn synthesized(&self) -> &SynthesizedState {
        &self.synthesized
    }

    /// Rows a type had before being replaced, oldest first
    #[must_use]
    pub fn replaced_type_history(&self, ty: &DeclKey) -> Vec<ReplacedType> {
        self.replaced_types
            .get(ty)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }
}
