use criterion::{Criterion, black_box, criterion_group, criterion_main};

use anari_cycles_core::Arena;
use anari_cycles_core::data_type::{DataType, cvt_color_to_u32_srgb, to_float4};
use anari_cycles_core::math::Vec4;

// ---------------------------------------------------------------------------
// Arena churn
// ---------------------------------------------------------------------------

fn bench_arena_insert_remove(c: &mut Criterion) {
    c.bench_function("arena_insert_remove_1k", |b| {
        b.iter(|| {
            let mut arena = Arena::new();
            let handles: Vec<_> = (0..1000u32).map(|i| arena.insert(i)).collect();
            for h in handles.iter().step_by(2) {
                arena.remove(*h);
            }
            black_box(arena.len());
        });
    });
}

// ---------------------------------------------------------------------------
// Element conversion
// ---------------------------------------------------------------------------

fn bench_to_float4_vec3(c: &mut Criterion) {
    let data: Vec<f32> = (0..3 * 4096).map(|i| i as f32).collect();
    let bytes: &[u8] = bytemuck::cast_slice(&data);
    c.bench_function("to_float4_float32_vec3_4k", |b| {
        b.iter(|| {
            let mut acc = Vec4::zeros();
            for i in 0..4096 {
                acc += to_float4(DataType::Float32Vec3, black_box(bytes), i);
            }
            black_box(acc);
        });
    });
}

fn bench_pack_srgb(c: &mut Criterion) {
    c.bench_function("cvt_color_to_u32_srgb_64x64", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for i in 0..64 * 64 {
                let v = i as f32 / 4096.0;
                acc ^= cvt_color_to_u32_srgb(&Vec4::new(v, v, v, 1.0));
            }
            black_box(acc);
        });
    });
}

criterion_group!(
    benches,
    bench_arena_insert_remove,
    bench_to_float4_vec3,
    bench_pack_srgb
);
criterion_main!(benches);
