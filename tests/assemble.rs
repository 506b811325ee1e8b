// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! End-to-end assembly scenarios.

use std::io::Write;

use forge6809::core::error::ErrorKind;
use forge6809::{AsmOutput, Assembler, Config};

fn assemble(src: &str) -> AsmOutput {
    Assembler::new(Config::default())
        .assemble_source("test.s", src)
        .expect("assembly should succeed")
}

fn assemble_err(src: &str) -> forge6809::core::error::AsmRunError {
    Assembler::new(Config::default())
        .assemble_source("test.s", src)
        .err()
        .expect("assembly should fail")
}

#[test]
fn immediate_load() {
    let out = assemble("\tORG $1000\n\tLDA #$42\n");
    assert_eq!(out.origin, 0x1000);
    assert_eq!(out.image, vec![0x86, 0x42]);
}

#[test]
fn setdp_selects_direct_or_extended() {
    let out = assemble("\tORG $1000\n\tSETDP $10\n\tLDA $1055\n");
    assert_eq!(out.image, vec![0x96, 0x55]);

    let out = assemble("\tORG $1000\n\tSETDP $20\n\tLDA $1055\n");
    assert_eq!(out.image, vec![0xb6, 0x10, 0x55]);
}

#[test]
fn backward_branch() {
    let out = assemble("\tORG $1000\nloop\tNOP\n\tBRA loop\n");
    assert_eq!(out.image, vec![0x12, 0x20, 0xfd]);
}

#[test]
fn forward_reference_branch() {
    let out = assemble("\tORG $1000\n\tBRA skip\n\tNOP\nskip\tNOP\n");
    assert_eq!(out.image, vec![0x20, 0x01, 0x12, 0x12]);
}

#[test]
fn macro_expansion_with_positional_args() {
    let src = "\
addd\tMACRO
\tADDA &1
\tADDB &2
\tENDM
\tORG $1000
\taddd #1,#2
";
    let out = assemble(src);
    assert_eq!(out.image, vec![0x8b, 0x01, 0xcb, 0x02]);
}

#[test]
fn stack_register_list() {
    let out = assemble("\tORG $1000\n\tPSHS A,B,X\n");
    assert_eq!(out.image, vec![0x34, 0x16]);
}

#[test]
fn register_pair_transfer() {
    let out = assemble("\tORG $1000\n\tTFR D,X\n");
    assert_eq!(out.image, vec![0x1f, 0x01]);
}

#[test]
fn indexed_auto_increment() {
    let out = assemble("\tORG $1000\n\tLDA ,X++\n");
    assert_eq!(out.image, vec![0xa6, 0x81]);
}

#[test]
fn local_label_references() {
    let out = assemble("\tORG $1000\n1\tNOP\n\tBRA 1B\n");
    assert_eq!(out.image, vec![0x12, 0x20, 0xfd]);

    let out = assemble("\tORG $1000\n\tBRA 1F\n1\tNOP\n");
    assert_eq!(out.image, vec![0x20, 0x00, 0x12]);
}

#[test]
fn fcc_mixes_strings_and_bytes() {
    let out = assemble("\tORG $1000\n\tFCC \"AB\",0,\"C\"\n");
    assert_eq!(out.image, vec![0x41, 0x42, 0x00, 0x43]);
}

#[test]
fn fdb_is_big_endian() {
    let out = assemble("\tORG $1000\n\tFDB $1234,$56\n");
    assert_eq!(out.image, vec![0x12, 0x34, 0x00, 0x56]);
}

#[test]
fn equ_and_expressions() {
    let out = assemble("val\tEQU $1234\n\tORG $1000\n\tLDX #val\n\tLDA #val/256\n");
    assert_eq!(out.image, vec![0x8e, 0x12, 0x34, 0x86, 0x12]);
}

#[test]
fn equ_forward_reference_converges() {
    let out = assemble("\tORG $1000\n\tLDX #val\nval\tEQU $2345\n");
    assert_eq!(out.image, vec![0x8e, 0x23, 0x45]);
}

#[test]
fn forward_direct_page_reference_converges() {
    // Pass 1 assembles the unknown address as extended; once the value is
    // known the direct form wins and a third pass settles the sizes.
    let out = assemble("\tORG $1000\n\tSETDP $00\n\tLDA var\nvar\tEQU $0055\n");
    assert_eq!(out.image, vec![0x96, 0x55]);
}

#[test]
fn rmb_reserves_without_emitting() {
    let out = assemble("\tORG $1000\n\tFCB 1\n\tRMB 3\n\tFCB 2\n");
    assert_eq!(out.image, vec![1, 0, 0, 0, 2]);
    assert_eq!(out.runs.len(), 2);
    assert_eq!(out.runs[0], (0x1000, vec![1]));
    assert_eq!(out.runs[1], (0x1004, vec![2]));
}

#[test]
fn rzb_emits_zeros() {
    let out = assemble("\tORG $1000\n\tRZB 3\n\tFCB 9\n");
    assert_eq!(out.image, vec![0, 0, 0, 9]);
    assert_eq!(out.runs.len(), 1);
}

#[test]
fn later_spans_overwrite_earlier_ones() {
    let out = assemble("\tORG $1000\n\tFCB 1,2,3,4\n\tORG $1001\n\tFCB $FF\n");
    assert_eq!(out.image, vec![0x01, 0xff, 0x03, 0x04]);
}

#[test]
fn put_diverges_physical_placement() {
    let out = assemble("\tORG $1000\n\tPUT $4000\nstart\tBRA start\n");
    // Assembled for $1000 but placed at $4000.
    assert_eq!(out.origin, 0x4000);
    assert_eq!(out.image, vec![0x20, 0xfe]);
}

#[test]
fn sections_keep_independent_pcs() {
    let src = "\
\tSECTION code
\tORG $1000
\tFCB 1
\tSECTION data
\tORG $2000
\tFCB 2
\tSECTION code
\tFCB 3
";
    let out = assemble(src);
    assert_eq!(out.origin, 0x1000);
    assert_eq!(out.image.len(), 0x1001);
    assert_eq!(out.image[0], 1);
    assert_eq!(out.image[1], 3);
    assert_eq!(out.image[0x1000], 2);
    assert_eq!(out.runs, vec![(0x1000, vec![1, 3]), (0x2000, vec![2])]);
}

#[test]
fn exported_symbols_carry_final_values() {
    let out = assemble("\tORG $1000\nstart\tNOP\ndone\tNOP\n\tEXPORT start,done\n");
    assert_eq!(
        out.exports,
        vec![("done".to_string(), 0x1001), ("start".to_string(), 0x1000)]
    );
}

#[test]
fn exporting_an_undefined_symbol_fails() {
    let err = assemble_err("\tORG $1000\n\tEXPORT nowhere\n");
    assert!(err
        .diagnostics()
        .iter()
        .any(|d| d.error.kind() == ErrorKind::UndefinedSymbol));
}

#[test]
fn assembly_is_deterministic() {
    let src = "\
\tORG $1000
loop\tLDA #$42
\tBNE loop
\tFCC \"hello\"
\tFDB *,loop
";
    let a = assemble(src);
    let b = assemble(src);
    assert_eq!(a.image, b.image);
    assert_eq!(a.origin, b.origin);
    let render = |out: &AsmOutput| {
        out.listing
            .iter()
            .map(|entry| format!("{}:{:?}:{}", entry.addr, entry.bytes, entry.text))
            .collect::<Vec<_>>()
    };
    assert_eq!(render(&a), render(&b));
}

#[test]
fn listing_covers_every_line() {
    let src = "; header\n\tORG $1000\n\tLDA #1\n";
    let out = assemble(src);
    assert_eq!(out.listing.len(), 3);
    assert_eq!(out.listing[0].addr, -1);
    assert_eq!(out.listing[2].addr, 0x1000);
    assert_eq!(out.listing[2].bytes, vec![0x86, 0x01]);
}

#[test]
fn macro_arguments_do_not_leak_across_frames() {
    let src = "\
m2\tMACRO
\tFCB &1
\tENDM
m1\tMACRO
\tm2 7
\tFCB &1
\tENDM
\tORG $1000
\tm1 5
";
    let out = assemble(src);
    assert_eq!(out.image, vec![7, 5]);
}

#[test]
fn nested_macro_definitions_capture_whole_body() {
    let src = "\
outer\tMACRO
inner\tMACRO
\tFCB 1
\tENDM
\tinner
\tENDM
\tORG $1000
\touter
\tinner
";
    let out = assemble(src);
    // outer defines inner and invokes it once; the second call is direct.
    assert_eq!(out.image, vec![1, 1]);
}

#[test]
fn macro_redefinition_in_one_pass_is_an_error() {
    let src = "\
m\tMACRO
\tNOP
\tENDM
m\tMACRO
\tNOP
\tENDM
";
    let err = assemble_err(src);
    assert!(err
        .diagnostics()
        .iter()
        .any(|d| d.error.message().contains("redefined")));
}

#[test]
fn macro_generated_labels_interpolate() {
    let src = "\
mk\tMACRO
lbl&1\tFCB &1
\tENDM
\tORG $1000
\tmk 1
\tmk 2
\tLDX #lbl1
\tLDY #lbl2
";
    let out = assemble(src);
    assert_eq!(
        out.image,
        vec![0x01, 0x02, 0x8e, 0x10, 0x00, 0x10, 0x8e, 0x10, 0x01]
    );
}

#[test]
fn branch_out_of_range_is_reported() {
    let err = assemble_err("\tORG $1000\n\tBRA far\n\tRMB 300\nfar\tNOP\n");
    assert!(err
        .diagnostics()
        .iter()
        .any(|d| d.error.kind() == ErrorKind::OutOfRange));
}

#[test]
fn long_branch_reaches_far_targets() {
    let out = assemble("\tORG $1000\n\tLBRA far\n\tRMB 300\nfar\tNOP\n");
    // far = $1000 + 3 + 300 = $112F; offset = $112F - $1003 = $12C.
    assert_eq!(out.image[..3], [0x16, 0x01, 0x2c]);
}

#[test]
fn unknown_instruction_is_a_syntax_error() {
    let err = assemble_err("\tORG $1000\n\tHCF\n");
    let diag = err
        .diagnostics()
        .iter()
        .find(|d| d.error.kind() == ErrorKind::Syntax)
        .expect("syntax diagnostic");
    assert_eq!(diag.line, 2);
    assert!(diag.error.message().contains("HCF"));
}

#[test]
fn division_by_zero_is_reported() {
    let err = assemble_err("\tORG $1000\n\tFCB 1/0\n");
    assert!(err
        .diagnostics()
        .iter()
        .any(|d| d.error.kind() == ErrorKind::NumericDomain));
}

#[test]
fn indexed_forms_assemble() {
    let src = "\
\tORG $1000
\tLDA 5,X
\tLDA -1,X
\tLDA 100,X
\tLDA 1000,X
\tLDA A,Y
\tLDA [10,Y]
\tLDA [$1234]
\tLEAX 1,X
";
    let out = assemble(src);
    assert_eq!(
        out.image,
        vec![
            0xa6, 0x05, // 5,X
            0xa6, 0x1f, // -1,X
            0xa6, 0x88, 0x64, // 100,X
            0xa6, 0x89, 0x03, 0xe8, // 1000,X
            0xa6, 0xa6, // A,Y
            0xa6, 0xb8, 0x0a, // [10,Y]
            0xa6, 0x9f, 0x12, 0x34, // [$1234]
            0x30, 0x01, // LEAX 1,X
        ]
    );
}

#[test]
fn size_hints_override_selection() {
    let out = assemble("\tORG $1000\n\tSETDP $00\n\tLDA <$55\n\tLDA >$55\n\tLDA <100,X\n");
    assert_eq!(
        out.image,
        vec![0x96, 0x55, 0xb6, 0x00, 0x55, 0xa6, 0x88, 0x64]
    );
}

#[test]
fn includebin_embeds_raw_bytes() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!(
        "forge6809-test-{}-{}.bin",
        std::process::id(),
        line!()
    ));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&[0xde, 0xad, 0xbe, 0xef]).unwrap();
    drop(file);

    let src = format!("\tORG $1000\n\tINCLUDEBIN \"{}\"\n", path.display());
    let out = assemble(&src);
    std::fs::remove_file(&path).ok();
    assert_eq!(out.image, vec![0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn include_assembles_in_place() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!(
        "forge6809-test-{}-{}.s",
        std::process::id(),
        line!()
    ));
    std::fs::write(&path, "\tFCB $11,$22\n").unwrap();

    let src = format!("\tORG $1000\n\tINCLUDE \"{}\"\n\tFCB $33\n", path.display());
    let out = assemble(&src);
    std::fs::remove_file(&path).ok();
    assert_eq!(out.image, vec![0x11, 0x22, 0x33]);
}

#[test]
fn missing_include_is_fatal() {
    let err = assemble_err("\tORG $1000\n\tINCLUDE \"no-such-file.s\"\n");
    assert_eq!(err.error().kind(), ErrorKind::FileNotFound);
}

#[test]
fn recursion_depth_is_bounded() {
    let src = "\
m\tMACRO
\tm
\tENDM
\tm
";
    let err = assemble_err(src);
    assert_eq!(err.error().kind(), ErrorKind::Fatal);
}

#[test]
fn errors_suppress_output_but_keep_reporting() {
    let err = assemble_err("\tORG $1000\n\tXYZZY\n\tPLUGH\n");
    // Both bad lines are reported.
    assert_eq!(
        err.diagnostics()
            .iter()
            .filter(|d| d.error.kind() == ErrorKind::Syntax)
            .count(),
        2
    );
}
