//! Deletion Tests
//!
//! Deleted members keep their rows, get throwing stub bodies and come back on
//! the same rows when reinserted.
//!
use enc_emit::prelude::*;
use enc_emit::DELETED_METHOD_MESSAGE;
use enc_metadata::{EncOperation, Handle, MetadataDelta, RowData, TableIndex, Token};
use enc_symbols::{AttributeData, DeclKey, TypeSymbol};
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

/// Instruction listing of the body attached to a MethodDef row of the delta
fn row_body(emitted: &Emitted, method: Handle) -> Vec<String> {
    let Some(RowData::MethodDef { rva: Some(offset), .. }) = emitted.delta().row(method) else {
        panic!("{method} has no body in the delta");
    };
    let code = body_at(&emitted.streams.il, *offset).code;
    enc_metadata::listing(&code)
        .expect("decodable IL")
        .lines()
        .map(str::to_owned)
        .collect()
}

fn method_row(delta: &MetadataDelta, name: &str) -> Handle {
    delta
        .rows_of(TableIndex::MethodDef)
        .find(|(_, row)| matches!(row, RowData::MethodDef { name: n, .. } if n == name))
        .map(|(handle, _)| handle)
        .unwrap_or_else(|| panic!("no MethodDef {name}"))
}

/// `N.C` with `F` and `G`
fn program() -> (ProgramBuilder, DeclKey, DeclKey) {
    let mut program = ProgramBuilder::new();
    let c = program.class("N", "C");
    program.method(&c, "F", &[], TypeSymbol::INT32, returns_int(1));
    let g = program.method(&c, "G", &[("x", TypeSymbol::INT32)], TypeSymbol::INT32, returns_int(2));
    (program, c, g)
}

#[test]
fn test_deleted_method_gets_stub_and_exception_type() {
    init_test_tracing();
    let (program, _, g) = program();
    let mut generations = Generations::start(&program.build());
    let g_token = generations.baseline().token_of(&g);

    let mut edited = program.clone();
    edited.remove(&g);
    let emitted = generations.emit(&edited.build(), &[SemanticEdit::delete(g.clone())]);

    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    let delta = emitted.delta();
    assert_eq!(delta.type_def_names(), vec!["HotReloadException"]);
    assert_eq!(delta.method_def_names(), vec!["G", ".ctor"]);
    assert_eq!(delta.field_def_names(), vec!["Code"]);
    assert_eq!(delta.member_ref_names(), vec![".ctor", ".ctor"]);

    let ctor = method_row(delta, ".ctor");
    let stub = row_body(&emitted, h(TableIndex::MethodDef, 2));
    assert_eq!(mnemonics(&stub), vec!["ldstr", "ldc.i4.s", "newobj", "throw"]);
    assert!(stub[1].ends_with("-2"));
    assert!(stub[2].ends_with(&ctor.token().to_string()));
    assert!(delta.user_strings().iter().any(|(_, s)| s == DELETED_METHOD_MESSAGE));

    assert_eq!(
        mnemonics(&row_body(&emitted, ctor)),
        vec!["ldarg.0", "ldarg.1", "call", "ldarg.0", "ldarg.2", "stfld", "ret"]
    );

    let baseline = generations.baseline();
    assert_eq!(baseline.token_of(&g), g_token);
    let record = baseline.deleted_member(&g).expect("deletion recorded");
    assert!(record.stub_body_generated);
    assert_eq!(record.generation, 1);
    assert_eq!(baseline.synthesized().hot_reload_exception(), Some(ctor.token()));
    assert!(emitted
        .result
        .synthesized
        .iter()
        .any(|r| r.name == "System.Runtime.CompilerServices.HotReloadException" && !r.reused));
}

#[test]
fn test_deleted_constructor_reuses_exception_type_later() {
    init_test_tracing();
    let mut program = ProgramBuilder::new();
    let c = program.class("N", "C");
    let ctor = program.constructor(&c, &[("value", TypeSymbol::INT32)]);
    let other = program.method(&c, "F", &[], TypeSymbol::VOID, empty_body());
    let mut generations = Generations::start(&program.build());

    program.remove(&ctor);
    let first = generations.emit(&program.build(), &[SemanticEdit::delete(ctor)]);
    assert!(first.is_success(), "{:?}", first.diagnostics());
    assert_eq!(first.delta().type_def_names(), vec!["HotReloadException"]);
    assert_eq!(first.delta().method_def_names(), vec![".ctor", ".ctor"]);

    let exception_ctor: Token = generations
        .baseline()
        .synthesized()
        .hot_reload_exception()
        .expect("synthesized by the first deletion");
    assert_eq!(exception_ctor, h(TableIndex::MethodDef, 3).token());
    let stub = row_body(&first, h(TableIndex::MethodDef, 1));
    assert_eq!(mnemonics(&stub), vec!["ldstr", "ldc.i4.s", "newobj", "throw"]);
    assert!(stub[1].ends_with("-2"));
    assert!(stub[2].ends_with(&exception_ctor.to_string()));

    program.remove(&other);
    let second = generations.emit(&program.build(), &[SemanticEdit::delete(other)]);
    assert!(second.is_success(), "{:?}", second.diagnostics());
    assert!(second.delta().type_def_names().is_empty());
    assert_eq!(second.delta().method_def_names(), vec!["F"]);
    let stub = row_body(&second, h(TableIndex::MethodDef, 2));
    assert_eq!(mnemonics(&stub), vec!["ldstr", "ldc.i4.s", "newobj", "throw"]);
    assert!(stub[1].ends_with("-2"));
    assert!(stub[2].ends_with(&exception_ctor.to_string()));
    assert_eq!(generations.baseline().synthesized().hot_reload_exception(), Some(exception_ctor));
}

#[test]
fn test_reinserted_method_restores_its_row_and_params() {
    init_test_tracing();
    let (program, _, g) = program();
    let mut generations = Generations::start(&program.build());
    let g_row = generations.baseline().definition(&g).map(|r| r.handle).expect("G row");
    let x = DeclKey::parameter(&g, 1);
    assert_eq!(generations.baseline().token_of(&x), Some(h(TableIndex::Param, 1).token()));

    let mut edited = program.clone();
    edited.remove(&g);
    let deleted = generations.emit(&edited.build(), &[SemanticEdit::delete(g.clone())]);
    assert!(deleted.is_success(), "{:?}", deleted.diagnostics());
    assert!(generations.baseline().is_deleted(&g));

    let reinserted = generations.emit(&program.build(), &[SemanticEdit::insert(g.clone())]);
    assert!(reinserted.is_success(), "{:?}", reinserted.diagnostics());
    let delta = reinserted.delta();
    assert!(delta.type_def_names().is_empty());
    assert_eq!(delta.method_def_names(), vec!["G"]);
    let params: Vec<(Handle, &RowData)> = delta.rows_of(TableIndex::Param).collect();
    assert_eq!(
        params,
        vec![(
            h(TableIndex::Param, 1),
            &RowData::Param {
                flags: 0,
                sequence: 1,
                name: "x".to_owned(),
            }
        )]
    );
    assert_eq!(delta.enc_map().handles(), &[g_row, h(TableIndex::Param, 1)]);
    assert!(delta.enc_log().iter().all(|e| e.operation == EncOperation::Default));
    assert_eq!(reinserted.body("N.C.G(int32)").method, g_row.token());

    let baseline = generations.baseline();
    assert!(!baseline.is_deleted(&g));
    assert_eq!(baseline.token_of(&g), Some(g_row.token()));
    assert_eq!(baseline.token_of(&x), Some(h(TableIndex::Param, 1).token()));
}

#[test]
fn test_deleted_member_is_marked_when_attribute_is_available() {
    init_test_tracing();
    let (mut program, _, g) = program();
    program.with_deleted_attribute();
    let mut generations = Generations::start(&program.build());
    let g_row = generations.baseline().definition(&g).map(|r| r.handle).expect("G row");

    let mut edited = program.clone();
    edited.remove(&g);
    let emitted = generations.emit(&edited.build(), &[SemanticEdit::delete(g.clone())]);
    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    let marks: Vec<_> = emitted
        .delta()
        .custom_attributes()
        .into_iter()
        .filter(|(_, parent, _)| *parent == Some(g_row.token()))
        .collect();
    assert_eq!(marks.len(), 1);

    // reinsertion retires the mark and restores the row
    let reinserted = generations.emit(&program.build(), &[SemanticEdit::insert(g.clone())]);
    assert!(reinserted.is_success(), "{:?}", reinserted.diagnostics());
    let delta = reinserted.delta();
    assert_eq!(delta.custom_attributes(), vec![(marks[0].0, None, marks[0].2)]);
    assert_eq!(delta.method_def_names(), vec!["G"]);
    assert!(delta.type_def_names().is_empty());
    assert!(delta.enc_log().iter().all(|e| e.operation == EncOperation::Default));
    assert_eq!(reinserted.body("N.C.G(int32)").method, g_row.token());
    assert_eq!(
        mnemonics(&reinserted.il("N.C.G(int32)")),
        vec!["ldc.i4.2", "ret"]
    );
    assert!(!generations.baseline().is_deleted(&g));
    assert_eq!(generations.baseline().token_of(&g), Some(g_row.token()));
}

#[test]
fn test_deletion_mark_keeps_existing_attributes() {
    init_test_tracing();
    let (mut program, _, g) = program();
    program
        .with_deleted_attribute()
        .attribute(&g, AttributeData::simple(TypeSymbol::external(COMPILER_GENERATED)));
    let mut generations = Generations::start(&program.build());
    let g_row = generations.baseline().definition(&g).map(|r| r.handle).expect("G row");
    let existing = h(TableIndex::CustomAttribute, 1);
    assert_eq!(generations.baseline().attribute_rows(g_row)[0].handle, existing);

    let mut edited = program.clone();
    edited.remove(&g);
    let deleted = generations.emit(&edited.build(), &[SemanticEdit::delete(g.clone())]);
    assert!(deleted.is_success(), "{:?}", deleted.diagnostics());
    let marks: Vec<Handle> = deleted
        .delta()
        .custom_attributes()
        .into_iter()
        .filter(|(_, parent, _)| *parent == Some(g_row.token()))
        .map(|(row, _, _)| row)
        .collect();
    assert_eq!(marks.len(), 1);
    assert_ne!(marks[0], existing);
    assert!(deleted.delta().row(existing).is_none());
    let live = generations
        .baseline()
        .attribute_rows(g_row)
        .iter()
        .filter(|row| row.data.is_some())
        .count();
    assert_eq!(live, 2);

    // reinsertion retires only the mark
    let reinserted = generations.emit(&program.build(), &[SemanticEdit::insert(g.clone())]);
    assert!(reinserted.is_success(), "{:?}", reinserted.diagnostics());
    let rows: Vec<(Handle, Option<Token>)> = reinserted
        .delta()
        .custom_attributes()
        .into_iter()
        .map(|(row, parent, _)| (row, parent))
        .collect();
    assert_eq!(rows, vec![(marks[0], None)]);
}

#[test]
fn test_deleted_type_stubs_its_methods() {
    init_test_tracing();
    let (mut program, c, g) = program();
    let d = program.class("N", "D");
    let m = program.method(&d, "M", &[], TypeSymbol::VOID, empty_body());
    program.field(&d, "count", TypeSymbol::INT32);
    let mut generations = Generations::start(&program.build());

    let mut edited = program.clone();
    edited.remove(&d);
    let emitted = generations.emit(&edited.build(), &[SemanticEdit::delete(d.clone())]);
    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    assert_eq!(emitted.delta().method_def_names(), vec!["M", ".ctor"]);

    let baseline = generations.baseline();
    assert!(baseline.is_deleted(&d));
    assert!(baseline.is_deleted(&m));
    assert!(baseline.is_deleted(&DeclKey::field(&d, "count")));
    assert!(!baseline.is_deleted(&c));
    assert!(!baseline.is_deleted(&g));
}

#[test]
fn test_stubs_disabled_by_options() {
    init_test_tracing();
    let (program, _, g) = program();
    let options = EmitOptions::default().with_deleted_member_stubs(false);
    let mut generations = Generations::with_options(&program.build(), options);

    let mut edited = program.clone();
    edited.remove(&g);
    let emitted = generations.emit(&edited.build(), &[SemanticEdit::delete(g.clone())]);
    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    assert!(emitted.delta().type_def_names().is_empty());
    assert!(emitted.streams.il.is_empty());
    let record = generations.baseline().deleted_member(&g).expect("deletion recorded");
    assert!(!record.stub_body_generated);
}

#[test]
fn test_deleting_twice_is_a_no_op() {
    init_test_tracing();
    let (program, _, g) = program();
    let mut generations = Generations::start(&program.build());

    let mut edited = program.clone();
    edited.remove(&g);
    let built = edited.build();
    assert!(generations.emit(&built, &[SemanticEdit::delete(g.clone())]).is_success());
    let again = generations.emit(&built, &[SemanticEdit::delete(g.clone())]);
    assert!(again.is_success(), "{:?}", again.diagnostics());
    assert!(again.delta().enc_map().is_empty());
    assert_eq!(generations.baseline().deleted_member(&g).map(|r| r.generation), Some(1));
}
