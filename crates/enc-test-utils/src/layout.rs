//! Generation-0 layout
//!
//! [`compile_full`] assigns metadata rows to every declaration of a program
//! the way a full compile would, including the lambdas, display classes,
//! anonymous types and delegates its scripted bodies rely on, and records the
//! local slots of each body as debug information.

use crate::program::Program;
use enc_emit::{
    primitive_signature, AnonymousTypeRecord, CapturedField, ClosureRecord, ContainerRecord, DebugInfoError,
    DebugInfoProvider, DelegateRecord, GeneratedBody, LambdaRecord, LocalSlot, MemberTarget, MethodIl,
    ModuleMetadata, ModuleMetadataBuilder, ReferenceKey,
};
use enc_metadata::{ContentHash, Handle, MethodSignature, SignatureType, TableIndex, Token};
use enc_symbols::{AnonymousTypeShape, AttributeData, DeclKey, DelegateShape, SymbolDetail, TypeKind, TypeSymbol};
use std::collections::BTreeMap;

/// Debug information of a fully compiled fixture module
#[derive(Debug, Clone, Default)]
pub struct FixtureDebugInfo {
    locals: BTreeMap<Token, Vec<LocalSlot>>,
}

impl FixtureDebugInfo {
    pub fn insert(&mut self, method: Token, slots: Vec<LocalSlot>) {
        self.locals.insert(method, slots);
    }

    #[must_use]
    pub fn locals(&self, method: Token) -> Option<&[LocalSlot]> {
        self.locals.get(&method).map(Vec::as_slice)
    }
}

impl DebugInfoProvider for FixtureDebugInfo {
    fn method_locals(&self, method: Token) -> Result<Vec<LocalSlot>, DebugInfoError> {
        Ok(self.locals.get(&method).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct Rows {
    next: BTreeMap<TableIndex, u32>,
}

impl Rows {
    fn next(&mut self, table: TableIndex) -> Handle {
        let row = self.next.entry(table).or_insert(0);
        *row += 1;
        Handle::new(table, *row)
    }
}

fn ordinal(index: usize) -> u16 {
    u16::try_from(index).expect("fixture ordinal")
}

fn synthesized_ordinal(index: usize) -> u32 {
    u32::try_from(index).expect("fixture ordinal")
}

/// Rows of the members a full compile synthesizes for scripted bodies
struct Synthesis<'a> {
    program: &'a Program,
    rows: &'a mut Rows,
    metadata: &'a mut ModuleMetadataBuilder,
    debug_info: &'a mut FixtureDebugInfo,
    types: BTreeMap<DeclKey, Handle>,
    type_refs: BTreeMap<String, Token>,
    containers: BTreeMap<DeclKey, ContainerRecord>,
    anonymous_types: BTreeMap<ContentHash, Handle>,
    delegates: BTreeMap<ContentHash, Handle>,
}

impl Synthesis<'_> {
    fn run(&mut self) {
        let program = self.program;
        for symbol in program.table().iter() {
            match &symbol.detail {
                SymbolDetail::Method(detail) => {
                    for param in &detail.params {
                        self.shapes_of(&param.ty);
                    }
                    self.shapes_of(&detail.return_type);
                    if let Some(body) = program.generator().body(&symbol.key) {
                        self.body(&symbol.key, body);
                    }
                }
                SymbolDetail::Field(detail) => self.shapes_of(&detail.ty),
                _ => {}
            }
        }
    }

    fn body(&mut self, method: &DeclKey, body: &GeneratedBody) {
        let owner = method.containing_type().expect("method owner").clone();
        let method_ordinal = self.program.table().method_ordinal(method).unwrap_or(0);

        let mut closure_types = Vec::with_capacity(body.closures.len());
        for (i, def) in body.closures.iter().enumerate() {
            let ordinal = synthesized_ordinal(i);
            let ty = self.rows.next(TableIndex::TypeDef);
            self.rows.next(TableIndex::NestedClass);
            let ctor = self.rows.next(TableIndex::MethodDef);
            let mut fields = Vec::with_capacity(def.captured.len());
            for (variable, captured) in &def.captured {
                self.shapes_of(captured);
                fields.push(CapturedField {
                    variable: variable.clone(),
                    field_name: variable.clone(),
                    ty: captured.clone(),
                    handle: self.rows.next(TableIndex::Field),
                });
            }
            closure_types.push(ty);
            self.metadata.closure(
                method.clone(),
                ClosureRecord {
                    ordinal,
                    syntax: def.scope_syntax,
                    name: format!("<>c__DisplayClass{method_ordinal}_{ordinal}"),
                    ty,
                    ctor,
                    fields,
                    generation: 0,
                },
            );
        }

        for (i, def) in body.lambdas.iter().enumerate() {
            let ordinal = synthesized_ordinal(i);
            let return_type = self.signature_type(&def.return_type);
            let params = def.params.iter().map(|p| self.signature_type(p)).collect();
            let signature = MethodSignature::instance(return_type, params)
                .encode()
                .expect("fixture lambda signature");
            let cache_field = match def.closure {
                Some(c) => {
                    assert!(c < closure_types.len(), "lambda {i} of {method} refers to closure {c}");
                    None
                }
                None => {
                    self.container(&owner);
                    Some(self.rows.next(TableIndex::Field))
                }
            };
            let handle = self.rows.next(TableIndex::MethodDef);
            if !def.body.locals.is_empty() {
                self.rows.next(TableIndex::StandAloneSig);
                self.debug_info
                    .insert(handle.token(), def.body.locals.iter().map(LocalSlot::live).collect());
            }
            self.metadata.lambda(
                method.clone(),
                LambdaRecord {
                    ordinal,
                    syntax: def.syntax,
                    name: format!("<{}>b__{method_ordinal}_{ordinal}", method.name()),
                    method: handle,
                    signature,
                    closure: def.closure.map(synthesized_ordinal),
                    cache_field,
                    generation: 0,
                    deleted: false,
                },
            );
            self.shapes_in(&def.body);
        }
        self.shapes_in(&body.il);
    }

    /// `<>c` container of `ty`, laid out with its first static lambda
    fn container(&mut self, ty: &DeclKey) -> ContainerRecord {
        if let Some(record) = self.containers.get(ty) {
            return record.clone();
        }
        let container = self.rows.next(TableIndex::TypeDef);
        self.rows.next(TableIndex::NestedClass);
        let instance = self.rows.next(TableIndex::Field);
        let ctor = self.rows.next(TableIndex::MethodDef);
        let cctor = self.rows.next(TableIndex::MethodDef);
        let record = ContainerRecord {
            name: "<>c".to_owned(),
            ty: container,
            instance,
            ctor,
            cctor,
            generation: 0,
        };
        self.metadata.lambda_container(ty.clone(), record.clone());
        self.containers.insert(ty.clone(), record.clone());
        record
    }

    fn shapes_in(&mut self, il: &MethodIl) {
        for local in &il.locals {
            self.shapes_of(&local.ty);
        }
        for op in &il.ops {
            match op.target() {
                Some(MemberTarget::AnonymousTypeConstructor(shape) | MemberTarget::AnonymousTypeGetter { shape, .. }) => {
                    self.anonymous_type(shape);
                }
                Some(MemberTarget::DelegateConstructor(shape) | MemberTarget::DelegateInvoke(shape)) => {
                    self.delegate(shape);
                }
                _ => {}
            }
        }
    }

    fn shapes_of(&mut self, ty: &TypeSymbol) {
        let mut shapes = Vec::new();
        ty.walk(&mut |t| {
            if matches!(t, TypeSymbol::Anonymous(_) | TypeSymbol::Delegate(_)) {
                shapes.push(t.clone());
            }
        });
        for shape in &shapes {
            self.signature_type(shape);
        }
    }

    fn anonymous_type(&mut self, shape: &AnonymousTypeShape) -> Handle {
        let key = shape.key();
        if let Some(ty) = self.anonymous_types.get(&key) {
            return *ty;
        }
        for (_, member) in &shape.members {
            self.signature_type(member);
        }
        let name = format!("<>f__AnonymousType{}", self.anonymous_types.len());
        let ty = self.rows.next(TableIndex::TypeDef);
        for _ in &shape.members {
            self.rows.next(TableIndex::Field);
        }
        let ctor = self.rows.next(TableIndex::MethodDef);
        for _ in &shape.members {
            self.rows.next(TableIndex::Param);
        }
        self.rows.next(TableIndex::PropertyMap);
        let mut getters = Vec::with_capacity(shape.members.len());
        for (member, _) in &shape.members {
            getters.push((member.clone(), self.rows.next(TableIndex::MethodDef)));
            self.rows.next(TableIndex::Property);
            self.rows.next(TableIndex::MethodSemantics);
        }
        self.metadata.anonymous_type(
            shape,
            AnonymousTypeRecord {
                name,
                ty,
                ctor,
                getters,
                generation: 0,
            },
        );
        self.anonymous_types.insert(key, ty);
        ty
    }

    fn delegate(&mut self, shape: &DelegateShape) -> Handle {
        let key = shape.key();
        if let Some(ty) = self.delegates.get(&key) {
            return *ty;
        }
        self.signature_type(&shape.return_type);
        for param in &shape.params {
            self.signature_type(param);
        }
        let name = format!("<>f__AnonymousDelegate{}", self.delegates.len());
        let ty = self.rows.next(TableIndex::TypeDef);
        let ctor = self.rows.next(TableIndex::MethodDef);
        self.rows.next(TableIndex::Param);
        self.rows.next(TableIndex::Param);
        let invoke = self.rows.next(TableIndex::MethodDef);
        for _ in &shape.params {
            self.rows.next(TableIndex::Param);
        }
        self.metadata.delegate(
            shape,
            DelegateRecord {
                name,
                ty,
                ctor,
                invoke,
                generation: 0,
            },
        );
        self.delegates.insert(key, ty);
        ty
    }

    /// Signature element of a type, laid out like the engine encodes it
    fn signature_type(&mut self, ty: &TypeSymbol) -> SignatureType {
        match ty {
            TypeSymbol::Primitive(p) => primitive_signature(*p),
            TypeSymbol::Defined(_) | TypeSymbol::External(_) => match self.named_type(ty) {
                (true, token) => SignatureType::ValueType(token),
                (false, token) => SignatureType::Class(token),
            },
            TypeSymbol::Generic { definition, args } => {
                let (value_type, definition) = self.named_type(definition);
                let args = args.iter().map(|a| self.signature_type(a)).collect();
                SignatureType::GenericInst {
                    value_type,
                    definition,
                    args,
                }
            }
            TypeSymbol::Array(element) => SignatureType::SzArray(Box::new(self.signature_type(element))),
            TypeSymbol::TypeParam(n) => SignatureType::Var(*n),
            TypeSymbol::MethodTypeParam(n) => SignatureType::MVar(*n),
            TypeSymbol::Anonymous(shape) => SignatureType::Class(self.anonymous_type(shape).token()),
            TypeSymbol::Delegate(shape) => SignatureType::Class(self.delegate(shape).token()),
        }
    }

    fn named_type(&mut self, ty: &TypeSymbol) -> (bool, Token) {
        let program = self.program;
        let table = program.table();
        match ty {
            TypeSymbol::Defined(key) => {
                let value_type = table
                    .get(key)
                    .and_then(|symbol| symbol.as_type())
                    .is_some_and(|detail| detail.kind == TypeKind::Struct);
                let handle = self.types.get(key).unwrap_or_else(|| panic!("{key} is not a laid out type"));
                (value_type, handle.token())
            }
            TypeSymbol::External(name) => {
                let value_type = table.references().get(name).is_some_and(|e| e.value_type);
                if let Some(token) = self.type_refs.get(name) {
                    return (value_type, *token);
                }
                let token = self.rows.next(TableIndex::TypeRef).token();
                self.metadata.reference(ReferenceKey::Type(name.clone()), token);
                self.type_refs.insert(name.clone(), token);
                (value_type, token)
            }
            other => panic!("{other} is not a named type"),
        }
    }
}

/// Lay out a program as generation 0
///
/// TypeDef row 1 is `<Module>`; declarations follow in declaration order and
/// synthesized members come last.
#[must_use]
pub fn compile_full(program: &Program) -> (ModuleMetadata, FixtureDebugInfo) {
    let table = program.table();
    let mut rows = Rows::default();
    let mut metadata = ModuleMetadata::builder();
    let mut debug_info = FixtureDebugInfo::default();
    rows.next(TableIndex::TypeDef);

    let mut property_maps: BTreeMap<DeclKey, Handle> = BTreeMap::new();
    let mut event_maps: BTreeMap<DeclKey, Handle> = BTreeMap::new();
    let mut attributes: Vec<(Handle, AttributeData)> = Vec::new();
    let mut types: BTreeMap<DeclKey, Handle> = BTreeMap::new();
    for symbol in table.iter() {
        let key = &symbol.key;
        let handle = match &symbol.detail {
            SymbolDetail::Type(detail) => {
                let handle = rows.next(TableIndex::TypeDef);
                types.insert(key.clone(), handle);
                if key.owner().is_some() {
                    rows.next(TableIndex::NestedClass);
                }
                for (i, name) in detail.generic_params.iter().enumerate() {
                    let param = rows.next(TableIndex::GenericParam);
                    metadata.definition(DeclKey::generic_param(key, ordinal(i), name.as_str()), param);
                }
                handle
            }
            SymbolDetail::Field(_) => rows.next(TableIndex::Field),
            SymbolDetail::Method(detail) => {
                let handle = rows.next(TableIndex::MethodDef);
                for (i, param) in detail.params.iter().enumerate() {
                    let row = rows.next(TableIndex::Param);
                    metadata.definition(DeclKey::parameter(key, ordinal(i + 1)), row);
                    attributes.extend(param.attributes.iter().map(|a| (row, a.clone())));
                }
                for (i, name) in detail.generic_params.iter().enumerate() {
                    let param = rows.next(TableIndex::GenericParam);
                    metadata.definition(DeclKey::generic_param(key, ordinal(i), name.as_str()), param);
                }
                if let Some(body) = program.generator().body(key) {
                    if !body.il.locals.is_empty() {
                        rows.next(TableIndex::StandAloneSig);
                        debug_info.insert(handle.token(), body.il.locals.iter().map(LocalSlot::live).collect());
                    }
                }
                handle
            }
            SymbolDetail::Property(detail) => {
                let owner = key.owner().expect("property owner");
                property_maps
                    .entry(owner.clone())
                    .or_insert_with(|| rows.next(TableIndex::PropertyMap));
                for _ in detail.accessors() {
                    rows.next(TableIndex::MethodSemantics);
                }
                rows.next(TableIndex::Property)
            }
            SymbolDetail::Event(detail) => {
                let owner = key.owner().expect("event owner");
                event_maps
                    .entry(owner.clone())
                    .or_insert_with(|| rows.next(TableIndex::EventMap));
                for _ in detail.accessors() {
                    rows.next(TableIndex::MethodSemantics);
                }
                rows.next(TableIndex::Event)
            }
        };
        metadata.definition(key.clone(), handle);
        attributes.extend(symbol.attributes.iter().map(|a| (handle, a.clone())));
    }

    for (ty, handle) in property_maps {
        metadata.property_map(ty, handle);
    }
    for (ty, handle) in event_maps {
        metadata.event_map(ty, handle);
    }
    for (parent, data) in attributes {
        let row = rows.next(TableIndex::CustomAttribute);
        metadata.attribute(parent, row, data);
    }

    let mut assemblies: BTreeMap<String, Token> = BTreeMap::new();
    let mut type_refs: BTreeMap<String, Token> = BTreeMap::new();
    for external in table.references().iter() {
        assemblies
            .entry(external.assembly.clone())
            .or_insert_with(|| rows.next(TableIndex::AssemblyRef).token());
        let type_ref = rows.next(TableIndex::TypeRef).token();
        metadata.reference(ReferenceKey::Type(external.full_name.clone()), type_ref);
        type_refs.insert(external.full_name.clone(), type_ref);
    }
    for (name, token) in assemblies {
        metadata.reference(ReferenceKey::Assembly(name), token);
    }

    Synthesis {
        program,
        rows: &mut rows,
        metadata: &mut metadata,
        debug_info: &mut debug_info,
        types,
        type_refs,
        containers: BTreeMap::new(),
        anonymous_types: BTreeMap::new(),
        delegates: BTreeMap::new(),
    }
    .run();

    for (table, count) in &rows.next {
        metadata.table_rows(*table, *count);
    }
    metadata.user_strings(1);
    (metadata.build(), debug_info)
}
