//! Benchmarks for tree reconstruction.
//!
//! Measures the full pipeline on synthetic method bodies:
//! - Straight-line arithmetic of growing length
//! - A loop with a reused local (splitting and merges)
//! - Nested exception regions
//! - A batch of methods, sequential versus parallel

extern crate cilast;

use cilast::{
    analysis::{build_methods, AstBuilder, BuildOptions},
    assembly::InstructionAssembler,
    metadata::{
        method::{ExceptionHandler, LocalDef, MethodBody},
        refs::MethodRef,
        resolver::{ReferenceCache, ReferenceTable},
        token::Token,
    },
    Result,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

const WRITE_LINE: Token = Token(0x0A00_0001);

fn references() -> ReferenceTable {
    let mut table = ReferenceTable::new();
    table.add_method(MethodRef::new(WRITE_LINE, "WriteLine", 1, false, false));
    table
}

/// `WriteLine(((0 + 1) + 2) + ... + n)`
fn arithmetic(n: i32) -> Result<MethodBody> {
    let mut asm = InstructionAssembler::new();
    asm.ldc_i4_0()?;
    for i in 1..=n {
        asm.ldc_i4_const(i)?.add()?;
    }
    asm.call(WRITE_LINE)?.ret()?;
    Ok(MethodBody::new(format!("Bench::Sum{n}"), asm.finish()?.instructions))
}

/// `for (i = 0; i < 100; i++) WriteLine(i);`
fn counting_loop() -> Result<MethodBody> {
    let mut asm = InstructionAssembler::new();
    asm.ldc_i4_0()?
        .stloc_0()?
        .br_s("check")?
        .label("body")?
        .ldloc_0()?
        .call(WRITE_LINE)?
        .ldloc_0()?
        .ldc_i4_1()?
        .add()?
        .stloc_0()?
        .label("check")?
        .ldloc_0()?
        .ldc_i4_s(100)?
        .blt_s("body")?
        .ret()?;
    Ok(MethodBody::new("Bench::Loop", asm.finish()?.instructions)
        .with_locals(vec![LocalDef::named("i")]))
}

/// `try { try { WriteLine(1) } catch { } } finally { WriteLine(2) }`
fn nested_regions() -> Result<MethodBody> {
    let mut asm = InstructionAssembler::new();
    asm.ldc_i4_1()?
        .call(WRITE_LINE)?
        .leave_s("inner_end")?
        .pop()?
        .leave_s("inner_end")?
        .label("inner_end")?
        .leave_s("end")?
        .ldc_i4_2()?
        .call(WRITE_LINE)?
        .endfinally()?
        .label("end")?
        .ret()?;
    let handlers = vec![
        ExceptionHandler::catch(0, 8, 8, 11, None),
        ExceptionHandler::finally(0, 13, 13, 20),
    ];
    Ok(MethodBody::new("Bench::Regions", asm.finish()?.instructions).with_handlers(handlers))
}

fn bench_arithmetic(c: &mut Criterion) {
    let resolver = references();
    let mut group = c.benchmark_group("astbuilder_arithmetic");
    for n in [8, 64, 512] {
        let body = arithmetic(n).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &body, |b, body| {
            b.iter(|| {
                let ast = AstBuilder::new(black_box(body), &resolver, BuildOptions::default())
                    .build()
                    .unwrap();
                black_box(ast)
            });
        });
    }
    group.finish();
}

fn bench_loop(c: &mut Criterion) {
    let resolver = references();
    let body = counting_loop().unwrap();
    c.bench_function("astbuilder_loop", |b| {
        b.iter(|| {
            let ast = AstBuilder::new(black_box(&body), &resolver, BuildOptions::default())
                .build()
                .unwrap();
            black_box(ast)
        });
    });
}

fn bench_regions(c: &mut Criterion) {
    let resolver = references();
    let body = nested_regions().unwrap();
    c.bench_function("astbuilder_regions", |b| {
        b.iter(|| {
            let ast = AstBuilder::new(black_box(&body), &resolver, BuildOptions::default())
                .build()
                .unwrap();
            black_box(ast)
        });
    });
}

fn bench_batch(c: &mut Criterion) {
    let resolver = ReferenceCache::new(references());
    let bodies: Vec<MethodBody> = (0..256)
        .map(|i| arithmetic(16 + i % 48).unwrap())
        .collect();

    let mut group = c.benchmark_group("astbuilder_batch");
    for parallel in [false, true] {
        let options = BuildOptions {
            parallel,
            ..BuildOptions::default()
        };
        let id = if parallel { "parallel" } else { "sequential" };
        group.bench_function(id, |b| {
            b.iter(|| black_box(build_methods(black_box(&bodies), &resolver, options)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_arithmetic, bench_loop, bench_regions, bench_batch);
criterion_main!(benches);
