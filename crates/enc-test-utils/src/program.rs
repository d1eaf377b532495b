//! Program DSL
//!
//! [`ProgramBuilder`] declares the types and members of one program version
//! together with the scripted bodies the [`FixtureCodeGenerator`] returns.
//! Builders are cheap to clone, so a test derives generation N+1 from the
//! builder of generation N.

use enc_emit::{CodeGenError, GeneratedBody, IlOp, MemberTarget, MethodCodeGenerator, MethodIl};
use enc_symbols::{
    signature_string, AttributeData, DeclKey, EventDetail, ExternalType, FieldDetail, MethodDetail, ParamDef,
    PropertyDetail, SymbolDef, SymbolDetail, SymbolTable, TypeDetail, TypeKind, TypeSymbol,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Assembly the fixture corlib types live in
pub const CORLIB: &str = "System.Runtime";

pub const COMPILER_GENERATED: &str = "System.Runtime.CompilerServices.CompilerGeneratedAttribute";
pub const EMBEDDED: &str = "Microsoft.CodeAnalysis.EmbeddedAttribute";
pub const METADATA_UPDATE_DELETED: &str = "System.Runtime.CompilerServices.MetadataUpdateDeletedAttribute";

fn attribute_type(full_name: &str) -> ExternalType {
    ExternalType::new(full_name, CORLIB)
        .with_base("System.Attribute")
        .with_method(".ctor", vec![], TypeSymbol::VOID)
}

/// Core types every fixture program references
#[must_use]
pub fn corlib() -> Vec<ExternalType> {
    vec![
        ExternalType::new("System.Object", CORLIB).with_method(".ctor", vec![], TypeSymbol::VOID),
        ExternalType::new("System.ValueType", CORLIB).with_base("System.Object"),
        ExternalType::new("System.Attribute", CORLIB).with_base("System.Object"),
        ExternalType::new("System.Exception", CORLIB)
            .with_base("System.Object")
            .with_method(".ctor", vec![TypeSymbol::STRING], TypeSymbol::VOID),
        ExternalType::new("System.Delegate", CORLIB).with_base("System.Object"),
        ExternalType::new("System.MulticastDelegate", CORLIB).with_base("System.Delegate"),
        attribute_type(COMPILER_GENERATED),
    ]
}

/// `ldarg.0; call System.Object::.ctor(); ret`
#[must_use]
pub fn object_constructor_body() -> MethodIl {
    MethodIl::new(
        vec![
            IlOp::Ldarg(0),
            IlOp::Call(MemberTarget::external_method(
                TypeSymbol::external("System.Object"),
                ".ctor",
                vec![],
                TypeSymbol::VOID,
                false,
            )),
            IlOp::Ret,
        ],
        1,
    )
}

/// `ldc.i4 value; ret`
#[must_use]
pub fn returns_int(value: i32) -> MethodIl {
    MethodIl::new(vec![IlOp::LdcI4(value), IlOp::Ret], 1)
}

/// `ldstr value; ret`
#[must_use]
pub fn returns_string(value: &str) -> MethodIl {
    MethodIl::new(vec![IlOp::Ldstr(value.to_owned()), IlOp::Ret], 1)
}

/// `ret`
#[must_use]
pub fn empty_body() -> MethodIl {
    MethodIl::new(vec![IlOp::Ret], 0)
}

fn method_detail(params: &[(&str, TypeSymbol)], return_type: TypeSymbol) -> MethodDetail {
    MethodDetail {
        params: params.iter().map(|(n, t)| ParamDef::new(*n, t.clone())).collect(),
        return_type,
        generic_params: Vec::new(),
        is_static: false,
        is_virtual: false,
        is_abstract: false,
        is_special_name: false,
    }
}

fn method_key(owner: &DeclKey, name: &str, arity: u32, params: &[(&str, TypeSymbol)]) -> DeclKey {
    let types: Vec<TypeSymbol> = params.iter().map(|(_, t)| t.clone()).collect();
    DeclKey::method(owner, name, arity, signature_string(&types))
}

fn within(key: &DeclKey, ancestor: &DeclKey) -> bool {
    let mut current = Some(key);
    while let Some(k) = current {
        if k == ancestor {
            return true;
        }
        current = k.owner();
    }
    false
}

/// Declarations and scripted bodies of one program version
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    symbols: Vec<SymbolDef>,
    references: Vec<ExternalType>,
    bodies: BTreeMap<DeclKey, GeneratedBody>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    /// Program referencing the fixture corlib
    #[must_use]
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            references: corlib(),
            bodies: BTreeMap::new(),
        }
    }

    /// Program without any referenced assembly
    #[must_use]
    pub fn bare() -> Self {
        Self {
            symbols: Vec::new(),
            references: Vec::new(),
            bodies: BTreeMap::new(),
        }
    }

    pub fn reference(&mut self, ty: ExternalType) -> &mut Self {
        self.references.retain(|r| r.full_name != ty.full_name);
        self.references.push(ty);
        self
    }

    /// Drop a referenced type
    pub fn unreference(&mut self, full_name: &str) -> &mut Self {
        self.references.retain(|r| r.full_name != full_name);
        self
    }

    /// Reference `Microsoft.CodeAnalysis.EmbeddedAttribute`
    pub fn with_embedded_attribute(&mut self) -> &mut Self {
        self.reference(attribute_type(EMBEDDED))
    }

    /// Reference `MetadataUpdateDeletedAttribute`
    pub fn with_deleted_attribute(&mut self) -> &mut Self {
        self.reference(attribute_type(METADATA_UPDATE_DELETED))
    }

    /// Add a raw declaration, replacing any declaration with the same key
    pub fn symbol(&mut self, symbol: SymbolDef) -> DeclKey {
        let key = symbol.key.clone();
        match self.symbols.iter_mut().find(|s| s.key == key) {
            Some(existing) => *existing = symbol,
            None => self.symbols.push(symbol),
        }
        key
    }

    pub fn type_def(&mut self, key: DeclKey, detail: TypeDetail) -> DeclKey {
        self.symbol(SymbolDef::new(key, SymbolDetail::Type(detail)))
    }

    /// Class deriving from `System.Object`
    pub fn class(&mut self, namespace: &str, name: &str) -> DeclKey {
        self.type_def(DeclKey::top_level(namespace, name, 0), TypeDetail::default())
    }

    pub fn generic_class(&mut self, namespace: &str, name: &str, params: &[&str]) -> DeclKey {
        let arity = u32::try_from(params.len()).expect("generic arity");
        self.type_def(
            DeclKey::top_level(namespace, name, arity),
            TypeDetail {
                generic_params: params.iter().map(|p| (*p).to_owned()).collect(),
                ..TypeDetail::default()
            },
        )
    }

    pub fn nested_class(&mut self, enclosing: &DeclKey, name: &str, params: &[&str]) -> DeclKey {
        let arity = u32::try_from(params.len()).expect("generic arity");
        self.type_def(
            DeclKey::nested(enclosing, name, arity),
            TypeDetail {
                generic_params: params.iter().map(|p| (*p).to_owned()).collect(),
                ..TypeDetail::default()
            },
        )
    }

    pub fn struct_type(&mut self, namespace: &str, name: &str) -> DeclKey {
        self.type_def(
            DeclKey::top_level(namespace, name, 0),
            TypeDetail {
                kind: TypeKind::Struct,
                ..TypeDetail::default()
            },
        )
    }

    pub fn interface(&mut self, namespace: &str, name: &str) -> DeclKey {
        self.type_def(
            DeclKey::top_level(namespace, name, 0),
            TypeDetail {
                kind: TypeKind::Interface,
                is_abstract: true,
                ..TypeDetail::default()
            },
        )
    }

    /// Local copy of an interop type embedded from a referenced assembly
    pub fn embedded_interop_type(&mut self, namespace: &str, name: &str) -> DeclKey {
        self.type_def(
            DeclKey::top_level(namespace, name, 0),
            TypeDetail {
                kind: TypeKind::Interface,
                is_abstract: true,
                embedded_interop: true,
                ..TypeDetail::default()
            },
        )
    }

    pub fn field(&mut self, owner: &DeclKey, name: &str, ty: TypeSymbol) -> DeclKey {
        self.symbol(SymbolDef::new(
            DeclKey::field(owner, name),
            SymbolDetail::Field(FieldDetail {
                ty,
                is_static: false,
                is_readonly: false,
            }),
        ))
    }

    /// Instance method with a scripted body
    pub fn method(
        &mut self,
        owner: &DeclKey,
        name: &str,
        params: &[(&str, TypeSymbol)],
        return_type: TypeSymbol,
        il: MethodIl,
    ) -> DeclKey {
        let key = self.symbol(SymbolDef::new(
            method_key(owner, name, 0, params),
            SymbolDetail::Method(method_detail(params, return_type)),
        ));
        self.bodies.insert(key.clone(), GeneratedBody::simple(il));
        key
    }

    pub fn static_method(
        &mut self,
        owner: &DeclKey,
        name: &str,
        params: &[(&str, TypeSymbol)],
        return_type: TypeSymbol,
        il: MethodIl,
    ) -> DeclKey {
        let mut detail = method_detail(params, return_type);
        detail.is_static = true;
        let key = self.symbol(SymbolDef::new(method_key(owner, name, 0, params), SymbolDetail::Method(detail)));
        self.bodies.insert(key.clone(), GeneratedBody::simple(il));
        key
    }

    pub fn generic_method(
        &mut self,
        owner: &DeclKey,
        name: &str,
        generic_params: &[&str],
        params: &[(&str, TypeSymbol)],
        return_type: TypeSymbol,
        il: MethodIl,
    ) -> DeclKey {
        let arity = u32::try_from(generic_params.len()).expect("generic arity");
        let mut detail = method_detail(params, return_type);
        detail.generic_params = generic_params.iter().map(|p| (*p).to_owned()).collect();
        let key = self.symbol(SymbolDef::new(method_key(owner, name, arity, params), SymbolDetail::Method(detail)));
        self.bodies.insert(key.clone(), GeneratedBody::simple(il));
        key
    }

    pub fn abstract_method(
        &mut self,
        owner: &DeclKey,
        name: &str,
        params: &[(&str, TypeSymbol)],
        return_type: TypeSymbol,
    ) -> DeclKey {
        let mut detail = method_detail(params, return_type);
        detail.is_abstract = true;
        detail.is_virtual = true;
        self.symbol(SymbolDef::new(method_key(owner, name, 0, params), SymbolDetail::Method(detail)))
    }

    /// Instance constructor calling `System.Object::.ctor()`
    pub fn constructor(&mut self, owner: &DeclKey, params: &[(&str, TypeSymbol)]) -> DeclKey {
        let mut detail = method_detail(params, TypeSymbol::VOID);
        detail.is_special_name = true;
        let key = self.symbol(SymbolDef::new(method_key(owner, ".ctor", 0, params), SymbolDetail::Method(detail)));
        self.bodies.insert(key.clone(), GeneratedBody::simple(object_constructor_body()));
        key
    }

    /// Read-only property with a `get_{name}` accessor
    pub fn property(&mut self, owner: &DeclKey, name: &str, ty: TypeSymbol, getter: MethodIl) -> DeclKey {
        let mut detail = method_detail(&[], ty.clone());
        detail.is_special_name = true;
        let getter_key = self.symbol(SymbolDef::new(
            method_key(owner, &format!("get_{name}"), 0, &[]),
            SymbolDetail::Method(detail),
        ));
        self.bodies.insert(getter_key.clone(), GeneratedBody::simple(getter));
        self.symbol(SymbolDef::new(
            DeclKey::property(owner, name, signature_string(&[])),
            SymbolDetail::Property(PropertyDetail {
                ty,
                params: Vec::new(),
                getter: Some(getter_key),
                setter: None,
                is_static: false,
            }),
        ))
    }

    /// Event with empty `add_{name}`/`remove_{name}` accessors
    pub fn event(&mut self, owner: &DeclKey, name: &str, ty: TypeSymbol) -> DeclKey {
        let mut accessor = |prefix: &str| {
            let params = [("value", ty.clone())];
            let mut detail = method_detail(&params, TypeSymbol::VOID);
            detail.is_special_name = true;
            let key = self.symbol(SymbolDef::new(
                method_key(owner, &format!("{prefix}_{name}"), 0, &params),
                SymbolDetail::Method(detail),
            ));
            self.bodies.insert(key.clone(), GeneratedBody::simple(empty_body()));
            key
        };
        let adder = accessor("add");
        let remover = accessor("remove");
        self.symbol(SymbolDef::new(
            DeclKey::event(owner, name),
            SymbolDetail::Event(EventDetail {
                ty,
                adder: Some(adder),
                remover: Some(remover),
            }),
        ))
    }

    /// Attach an attribute to a declaration
    pub fn attribute(&mut self, key: &DeclKey, attribute: AttributeData) -> &mut Self {
        let symbol = self.symbols.iter_mut().find(|s| &s.key == key).expect("declared symbol");
        symbol.attributes.push(attribute);
        self
    }

    /// Remove every attribute of a declaration
    pub fn clear_attributes(&mut self, key: &DeclKey) -> &mut Self {
        let symbol = self.symbols.iter_mut().find(|s| &s.key == key).expect("declared symbol");
        symbol.attributes.clear();
        self
    }

    /// Replace the scripted body of a method
    pub fn body(&mut self, method: &DeclKey, body: GeneratedBody) -> &mut Self {
        self.bodies.insert(method.clone(), body);
        self
    }

    /// Replace the scripted body of a method with plain IL
    pub fn il(&mut self, method: &DeclKey, il: MethodIl) -> &mut Self {
        self.body(method, GeneratedBody::simple(il))
    }

    /// Remove a declaration with everything nested in it
    pub fn remove(&mut self, key: &DeclKey) -> &mut Self {
        self.symbols.retain(|s| !within(&s.key, key));
        self.bodies.retain(|k, _| !within(k, key));
        self
    }

    /// Whether the builder declares `key`
    #[must_use]
    pub fn declares(&self, key: &DeclKey) -> bool {
        self.symbols.iter().any(|s| &s.key == key)
    }

    /// Build the symbol table and code generator
    ///
    /// # Panics
    /// Panics if the declarations do not form a valid symbol table
    #[must_use]
    pub fn build(&self) -> Program {
        let mut builder = SymbolTable::builder();
        for reference in &self.references {
            builder.reference(reference.clone());
        }
        for symbol in &self.symbols {
            builder.add(symbol.clone()).expect("unique declaration");
        }
        let table = builder.build().expect("valid fixture program");
        Program {
            compilation: Arc::new(table),
            generator: FixtureCodeGenerator {
                bodies: self.bodies.clone(),
                failing: BTreeMap::new(),
            },
        }
    }
}

/// One built program version
#[derive(Debug, Clone)]
pub struct Program {
    compilation: Arc<SymbolTable>,
    generator: FixtureCodeGenerator,
}

impl Program {
    #[must_use]
    pub fn compilation(&self) -> Arc<SymbolTable> {
        Arc::clone(&self.compilation)
    }

    #[must_use]
    pub fn table(&self) -> &SymbolTable {
        &self.compilation
    }

    #[must_use]
    pub fn generator(&self) -> &FixtureCodeGenerator {
        &self.generator
    }

    /// Same program whose generator fails for `method`
    #[must_use]
    pub fn failing_for(mut self, method: &DeclKey, message: &str) -> Self {
        self.generator.failing.insert(method.clone(), message.to_owned());
        self
    }
}

/// Code generator returning scripted bodies
#[derive(Debug, Clone, Default)]
pub struct FixtureCodeGenerator {
    bodies: BTreeMap<DeclKey, GeneratedBody>,
    failing: BTreeMap<DeclKey, String>,
}

impl FixtureCodeGenerator {
    /// Scripted body of `method`
    #[must_use]
    pub fn body(&self, method: &DeclKey) -> Option<&GeneratedBody> {
        self.bodies.get(method)
    }
}

impl MethodCodeGenerator for FixtureCodeGenerator {
    fn generate(&self, _compilation: &SymbolTable, method: &DeclKey) -> Result<GeneratedBody, CodeGenError> {
        if let Some(message) = self.failing.get(method) {
            return Err(CodeGenError::new(method, message.clone()));
        }
        self.bodies
            .get(method)
            .cloned()
            .ok_or_else(|| CodeGenError::new(method, "no scripted body"))
    }
}
