//! Benchmark: chunking throughput and a full in-process deployment.

use std::time::Instant;

use kiln_sim::{SimConfig, SimHost};
use kiln_upload::{chunks, ChunkSize, Deployer, UploadConfig};

const MIB: usize = 1024 * 1024;

fn bench_chunking(data: &[u8], size: ChunkSize, iters: usize) -> f64 {
    let start = Instant::now();
    let mut total = 0usize;
    for _ in 0..iters {
        total += chunks(data, size).map(|c| c.bytes.len()).sum::<usize>();
    }
    assert_eq!(total, data.len() * iters);
    start.elapsed().as_secs_f64() / iters as f64
}

fn bench_deploy(rt: &tokio::runtime::Runtime, tokenizer: &[u8], model: &[u8], chunk_mib: f64) -> f64 {
    let host = SimHost::new(SimConfig::default());
    let config = UploadConfig { chunk_size_mib: chunk_mib, ..UploadConfig::default() };
    let mut deployer = Deployer::new(host.owner(), config);
    let start = Instant::now();
    rt.block_on(deployer.deploy(tokenizer, model)).unwrap();
    start.elapsed().as_secs_f64()
}

fn main() {
    println!("=== Kiln Chunking Benchmark ===\n");

    let model_len = 64 * MIB;
    let mut model: Vec<u8> = [288i32, 768, 6, 6, 6, 32000, 256].iter().flat_map(|v| v.to_le_bytes()).collect();
    model.extend((0..model_len).map(|i| (i % 251) as u8));
    let tokenizer: Vec<u8> = (0..MIB / 2).map(|i| (i % 7) as u8).collect();

    let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();

    println!("{:<14} {:>8} {:>14} {:>14}", "Chunk (MiB)", "Chunks", "Split (us)", "Deploy (ms)");
    println!("{}", "-".repeat(54));

    for &mib in &[0.25, 0.5, 1.0, 1.9, 4.0] {
        let size = ChunkSize::from_mib(mib).unwrap();
        let split = bench_chunking(&model, size, 50);
        let deploy = bench_deploy(&rt, &tokenizer, &model, mib);
        println!(
            "{:<14} {:>8} {:>14.1} {:>14.2}",
            mib,
            size.chunk_count(model.len()),
            split * 1e6,
            deploy * 1e3
        );
    }
}
