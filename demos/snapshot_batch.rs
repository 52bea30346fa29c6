use std::time::Duration;

use snapshot_pool::{BitmapPool, PoolConfig, PoolError};

// Renders a batch of "frames" from many tasks through a small pool, the way
// a snapshot suite shares scratch bitmaps between concurrent test cases.
#[tokio::main]
async fn main() -> Result<(), PoolError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::var("POOL_CONFIG") {
        Ok(json) => PoolConfig::from_json(&json)?,
        Err(_) => PoolConfig::new(4),
    };
    let pool = BitmapPool::with_config(config)?;

    let frames = (0..24u32).map(|frame| {
        let pool = pool.clone();
        tokio::spawn(async move {
            let (width, height) = if frame % 4 == 0 { (128, 128) } else { (64, 64) };
            let mut bitmap = pool.acquire(width, height).await?;
            let shade = (frame * 10 % 256) as u8;
            bitmap.fill(&[shade, shade, shade, 255]);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let checksum: u64 = bitmap.pixels().iter().map(|&b| b as u64).sum();
            pool.release(bitmap)?;
            Ok::<_, PoolError>((frame, checksum))
        })
    });

    for handle in futures::future::join_all(frames).await {
        match handle {
            Ok(Ok((frame, checksum))) => println!("frame {frame:>2}: checksum {checksum}"),
            Ok(Err(e)) => eprintln!("frame failed: {e}"),
            Err(e) => eprintln!("render task panicked: {e}"),
        }
    }

    println!("{}", pool.stats().to_json()?);
    Ok(())
}
