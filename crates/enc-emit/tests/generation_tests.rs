//! Generation Tests
//!
//! Row allocation and token stability across chained generations.
//!
use enc_emit::prelude::*;
use enc_metadata::{EncLogEntry, EncOperation, Handle, RowData, TableIndex};
use enc_symbols::{DeclKey, TypeSymbol};
use enc_test_utils::*;
use pretty_assertions::assert_eq;

fn h(table: TableIndex, row: u32) -> Handle {
    Handle::new(table, row)
}

fn mnemonics(listing: &[String]) -> Vec<String> {
    listing
        .iter()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_owned)
        .collect()
}

/// `N.C` with `F() -> int32` returning 1
fn program_with_f() -> (ProgramBuilder, DeclKey, DeclKey) {
    let mut program = ProgramBuilder::new();
    let c = program.class("N", "C");
    let f = program.method(&c, "F", &[], TypeSymbol::INT32, returns_int(1));
    (program, c, f)
}

#[test]
fn test_body_only_update_touches_method_row() {
    init_test_tracing();
    let (mut program, _, f) = program_with_f();
    let mut generations = Generations::start(&program.build());

    program.il(&f, returns_int(2));
    let emitted = generations.emit(&program.build(), &[SemanticEdit::update(f.clone())]);

    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    let delta = emitted.delta();
    assert_eq!(delta.generation(), 1);
    assert_eq!(delta.enc_map().definitions(), vec![h(TableIndex::MethodDef, 1)]);
    assert_eq!(
        delta.enc_log().entries(),
        &[EncLogEntry::new(h(TableIndex::MethodDef, 1), EncOperation::Default)]
    );

    let body = emitted.body("N.C.F()");
    assert_eq!(body.method, h(TableIndex::MethodDef, 1).token());
    assert_eq!(mnemonics(&emitted.il("N.C.F()")), vec!["ldc.i4.2", "ret"]);
    match delta.row(h(TableIndex::MethodDef, 1)) {
        Some(RowData::MethodDef { rva, name, .. }) => {
            assert_eq!(*rva, Some(body.offset));
            assert_eq!(name, "F");
        }
        other => panic!("unexpected row {other:?}"),
    }
    assert_eq!(generations.baseline().generation(), 1);
}

#[test]
fn test_inserted_methods_keep_tokens_across_generations() {
    init_test_tracing();
    let (mut program, c, f) = program_with_f();
    let mut generations = Generations::start(&program.build());
    let f_token = generations.baseline().token_of(&f);

    let g = program.method(&c, "G", &[], TypeSymbol::STRING, returns_string("g"));
    let first = generations.emit(&program.build(), &[SemanticEdit::insert(g.clone())]);
    assert!(first.is_success(), "{:?}", first.diagnostics());
    assert_eq!(
        first.delta().enc_log().entries(),
        &[
            EncLogEntry::new(h(TableIndex::TypeDef, 2), EncOperation::AddMethod),
            EncLogEntry::new(h(TableIndex::MethodDef, 2), EncOperation::Default),
        ]
    );
    assert_eq!(first.delta().user_strings().len(), 1);

    let hm = program.method(&c, "H", &[("value", TypeSymbol::INT32)], TypeSymbol::VOID, empty_body());
    let second = generations.emit(&program.build(), &[SemanticEdit::insert(hm.clone())]);
    assert!(second.is_success(), "{:?}", second.diagnostics());
    assert_eq!(second.delta().method_def_names(), vec!["H"]);
    assert_eq!(second.delta().enc_base_id(), first.delta().enc_id());
    assert_eq!(
        second.delta().enc_log().definitions(),
        vec![
            EncLogEntry::new(h(TableIndex::TypeDef, 2), EncOperation::AddMethod),
            EncLogEntry::new(h(TableIndex::MethodDef, 3), EncOperation::Default),
            EncLogEntry::new(h(TableIndex::MethodDef, 3), EncOperation::AddParameter),
            EncLogEntry::new(h(TableIndex::Param, 1), EncOperation::Default),
        ]
    );

    let baseline = generations.baseline();
    assert_eq!(baseline.generation(), 2);
    assert_eq!(baseline.token_of(&f), f_token);
    assert_eq!(baseline.token_of(&g), Some(h(TableIndex::MethodDef, 2).token()));
    assert_eq!(baseline.token_of(&hm), Some(h(TableIndex::MethodDef, 3).token()));
    assert_eq!(
        baseline.token_of(&DeclKey::parameter(&hm, 1)),
        Some(h(TableIndex::Param, 1).token())
    );
}

#[test]
fn test_inserted_nested_generic_type() {
    init_test_tracing();
    let (mut program, outer, _) = program_with_f();
    let mut generations = Generations::start(&program.build());

    let inner = program.nested_class(&outer, "Inner", &["T"]);
    program.field(&inner, "value", TypeSymbol::TypeParam(0));
    let emitted = generations.emit(&program.build(), &[SemanticEdit::insert(inner.clone())]);

    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    let delta = emitted.delta();
    assert_eq!(delta.type_def_names(), vec!["Inner`1"]);
    assert_eq!(delta.field_def_names(), vec!["value"]);
    assert!(delta
        .enc_log()
        .iter()
        .any(|e| *e == EncLogEntry::new(h(TableIndex::TypeDef, 3), EncOperation::AddField)));

    match delta.row(h(TableIndex::TypeDef, 3)) {
        Some(RowData::TypeDef { namespace, .. }) => assert_eq!(namespace, ""),
        other => panic!("unexpected row {other:?}"),
    }
    let nested: Vec<&RowData> = delta.rows_of(TableIndex::NestedClass).map(|(_, r)| r).collect();
    assert_eq!(
        nested,
        vec![&RowData::NestedClass {
            nested: h(TableIndex::TypeDef, 3).token(),
            enclosing: h(TableIndex::TypeDef, 2).token(),
        }]
    );
    let params: Vec<&RowData> = delta.rows_of(TableIndex::GenericParam).map(|(_, r)| r).collect();
    assert_eq!(
        params,
        vec![&RowData::GenericParam {
            number: 0,
            flags: 0,
            owner: h(TableIndex::TypeDef, 3).token(),
            name: "T".to_owned(),
        }]
    );
    assert!(delta.type_ref_names().is_empty(), "System.Object reference is reused");
    assert_eq!(
        generations.baseline().token_of(&inner),
        Some(h(TableIndex::TypeDef, 3).token())
    );
}

#[test]
fn test_inserted_property_creates_map_and_semantics() {
    init_test_tracing();
    let (mut program, c, _) = program_with_f();
    let mut generations = Generations::start(&program.build());

    let p = program.property(&c, "P", TypeSymbol::INT32, returns_int(5));
    let emitted = generations.emit(&program.build(), &[SemanticEdit::insert(p.clone())]);

    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    let delta = emitted.delta();
    assert_eq!(delta.property_def_names(), vec!["P"]);
    assert_eq!(delta.method_def_names(), vec!["get_P"]);
    assert_eq!(
        delta.row(h(TableIndex::PropertyMap, 1)),
        Some(&RowData::PropertyMap {
            parent: h(TableIndex::TypeDef, 2).token()
        })
    );
    assert!(delta
        .enc_log()
        .iter()
        .any(|e| *e == EncLogEntry::new(h(TableIndex::PropertyMap, 1), EncOperation::AddProperty)));
    match delta.row(h(TableIndex::MethodSemantics, 1)) {
        Some(RowData::MethodSemantics {
            method, association, ..
        }) => {
            assert_eq!(*method, h(TableIndex::MethodDef, 2).token());
            assert_eq!(*association, h(TableIndex::Property, 1).token());
        }
        other => panic!("unexpected row {other:?}"),
    }
    assert_eq!(mnemonics(&emitted.il("N.C.get_P()")), vec!["ldc.i4.5", "ret"]);
    assert_eq!(generations.baseline().property_map(&c), Some(h(TableIndex::PropertyMap, 1)));
}

#[test]
fn test_renamed_property_with_new_accessor_is_deleted_and_inserted() {
    init_test_tracing();
    let (mut program, c, _) = program_with_f();
    let p = program.property(&c, "P", TypeSymbol::INT32, returns_int(5));
    let built = program.build();
    let get_p = built.table().get(&p).expect("P declared").accessors()[0].clone();
    let mut generations = Generations::start(&built);
    let get_p_row = generations.baseline().definition(&get_p).map(|r| r.handle).expect("get_P row");
    assert_eq!(generations.baseline().token_of(&p), Some(h(TableIndex::Property, 1).token()));

    program.remove(&p).remove(&get_p);
    let q = program.property(&c, "Q", TypeSymbol::INT32, returns_int(6));
    let rename = SemanticEdit::Update {
        old_symbol: p.clone(),
        new_symbol: q.clone(),
        syntax_map: None,
    };
    let emitted = generations.emit(&program.build(), &[rename]);
    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());

    let delta = emitted.delta();
    assert_eq!(delta.property_def_names(), vec!["Q"]);
    assert_eq!(delta.method_def_names(), vec!["get_P", "get_Q", ".ctor"]);
    assert_eq!(delta.type_def_names(), vec!["HotReloadException"]);
    assert!(delta
        .enc_log()
        .iter()
        .any(|e| *e == EncLogEntry::new(h(TableIndex::PropertyMap, 1), EncOperation::AddProperty)));
    assert_eq!(mnemonics(&emitted.il("N.C.get_Q()")), vec!["ldc.i4.6", "ret"]);

    let baseline = generations.baseline();
    assert!(baseline.is_deleted(&p));
    assert!(baseline.is_deleted(&get_p));
    assert_eq!(baseline.token_of(&p), Some(h(TableIndex::Property, 1).token()));
    assert_eq!(baseline.token_of(&get_p), Some(get_p_row.token()));
    assert_eq!(baseline.token_of(&q), Some(h(TableIndex::Property, 2).token()));
}

#[test]
fn test_inserted_event_on_existing_map() {
    init_test_tracing();
    let (mut program, c, _) = program_with_f();
    let handler = TypeSymbol::external("System.Delegate");
    program.event(&c, "Changed", handler.clone());
    let mut generations = Generations::start(&program.build());
    let existing_map = generations.baseline().event_map(&c);
    assert!(existing_map.is_some());

    let e = program.event(&c, "Closed", handler);
    let emitted = generations.emit(&program.build(), &[SemanticEdit::insert(e)]);

    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    let delta = emitted.delta();
    assert_eq!(delta.event_def_names(), vec!["Closed"]);
    assert_eq!(delta.method_def_names(), vec!["add_Closed", "remove_Closed"]);
    assert!(delta.rows_of(TableIndex::EventMap).next().is_none());
    let map = existing_map.map(|m| EncLogEntry::new(m, EncOperation::AddEvent));
    assert!(delta.enc_log().iter().any(|e| Some(*e) == map));
    assert_eq!(delta.rows_of(TableIndex::MethodSemantics).count(), 2);
}

#[test]
fn test_replaced_type_gets_fresh_row_and_generation_name() {
    init_test_tracing();
    let (mut program, c, f) = program_with_f();
    program.field(&c, "x", TypeSymbol::INT32);
    let mut generations = Generations::start(&program.build());
    let previous = generations.baseline().definition(&c).map(|r| r.handle);

    program.field(&c, "y", TypeSymbol::STRING);
    let emitted = generations.emit(&program.build(), &[SemanticEdit::replace(c.clone())]);

    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    let delta = emitted.delta();
    assert_eq!(delta.type_def_names(), vec!["C#1"]);
    assert_eq!(delta.field_def_names(), vec!["x", "y"]);
    assert_eq!(delta.method_def_names(), vec!["F"]);
    assert_eq!(mnemonics(&emitted.il("N.C.F()")), vec!["ldc.i4.1", "ret"]);

    let baseline = generations.baseline();
    assert_eq!(baseline.token_of(&c), Some(h(TableIndex::TypeDef, 3).token()));
    assert_eq!(baseline.token_of(&f), Some(h(TableIndex::MethodDef, 2).token()));
    let history = baseline.replaced_type_history(&c);
    assert_eq!(history.len(), 1);
    assert_eq!(Some(history[0].handle), previous);
    assert_eq!(history[0].generation, 1);
}

#[test]
fn test_emit_options_load_from_toml() {
    let options = EmitOptions::from_toml_str(
        r#"
        emit_debug_stream = false
        core_assembly = "mscorlib"
        "#,
    )
    .expect("valid options");
    assert!(!options.emit_debug_stream);
    assert_eq!(options.core_assembly, "mscorlib");
    assert!(options.emit_deleted_member_stubs);

    let (mut program, _, f) = program_with_f();
    let mut generations = Generations::with_options(&program.build(), options);
    program.il(&f, returns_int(3));
    let emitted = generations.emit(&program.build(), &[SemanticEdit::update(f)]);
    assert!(emitted.is_success());
    assert!(emitted.streams.debug.is_empty());
    assert!(!emitted.streams.metadata.is_empty());
}
