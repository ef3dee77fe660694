//! Host model vs wgpu backend
//!
//! Run with: cargo test --release --features gpu cpu_vs_gpu -- --nocapture --ignored

#![cfg(feature = "gpu")]

use romix_simt::device::layout::WORK_UNIT_WORDS;
use romix_simt::{
    DeviceConfig, Dispatcher, GpuBackend, GpuContext, GpuDispatcher, LaunchConfig, LaunchError,
    RomixEngine, ScryptHasher,
};
use std::time::Instant;

fn init_context() -> Option<GpuContext> {
    match pollster::block_on(GpuContext::new(0, GpuBackend::Auto)) {
        Ok(ctx) => {
            println!("GPU: {} ({:?})", ctx.device_name(), ctx.backend());
            Some(ctx)
        }
        Err(e) => {
            println!("No GPU available, skipping: {e:#}");
            None
        }
    }
}

fn input_words(units: usize) -> Vec<u32> {
    (0..units * WORK_UNIT_WORDS)
        .map(|i| (i as u32).wrapping_mul(0x2c1b_3c6d) ^ 0x5bd1_e995)
        .collect()
}

#[test]
#[ignore]
fn cpu_vs_gpu_outputs_match() {
    let Some(ctx) = init_context() else { return };

    for groups in [1, 3, 8, 24] {
        let config = LaunchConfig::new(groups, 2).with_device(DeviceConfig::default());
        let input = input_words(config.geometry().unwrap().work_units());

        let t0 = Instant::now();
        let (cpu, _) = Dispatcher::new(config).unwrap().dispatch(&input).unwrap();
        let cpu_time = t0.elapsed();

        let gpu_dispatcher = GpuDispatcher::new(ctx.clone(), config).unwrap();
        let t1 = Instant::now();
        let (gpu, _) = gpu_dispatcher.dispatch(&input).unwrap();
        let gpu_time = t1.elapsed();

        println!(
            "groups={groups:>2}: cpu {:.3}s, gpu {:.3}s",
            cpu_time.as_secs_f64(),
            gpu_time.as_secs_f64()
        );
        assert_eq!(cpu, gpu, "groups={groups}");
    }
}

#[test]
#[ignore]
fn gpu_hasher_matches_scrypt() {
    let Some(ctx) = init_context() else { return };

    let hasher =
        ScryptHasher::with_engine(GpuDispatcher::new(ctx, LaunchConfig::new(2, 1)).unwrap());
    assert_eq!(hasher.engine().name(), "gpu");

    let inputs = [(b"password".to_vec(), b"NaCl".to_vec())];
    let digests = hasher.hash_batch(&inputs, 32).unwrap();

    let params = scrypt::Params::new(10, 1, 1, 32).unwrap();
    let mut expected = [0u8; 32];
    scrypt::scrypt(b"password", b"NaCl", &params, &mut expected).unwrap();
    assert_eq!(digests[0], expected);
}

#[test]
#[ignore]
fn gpu_rejects_unsupported_group_count() {
    let Some(ctx) = init_context() else { return };

    let err = GpuDispatcher::new(ctx, LaunchConfig::new(25, 1))
        .err()
        .expect("group count 25 must be rejected");
    assert!(matches!(err, LaunchError::UnsupportedGroupCount { .. }));
}
