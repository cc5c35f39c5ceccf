use rand::Rng;

/// Writes `len` random bytes to `path` and returns them.
pub async fn write_random_file(path: &std::path::Path, len: usize) -> anyhow::Result<Vec<u8>> {
    let mut content = vec![0u8; len];
    {
        // make sure rng falls out of scope before await
        let mut rng = rand::thread_rng();
        rng.fill(&mut content[..]);
    }
    tokio::fs::write(path, &content).await?;
    Ok(content)
}

pub async fn check_files_identical(
    src: &std::path::Path,
    dst: &std::path::Path,
) -> anyhow::Result<()> {
    let src_content = tokio::fs::read(src).await?;
    let dst_content = tokio::fs::read(dst).await?;
    assert_eq!(src_content.len(), dst_content.len(), "length mismatch");
    if let Some(idx) = src_content
        .iter()
        .zip(dst_content.iter())
        .position(|(a, b)| a != b)
    {
        panic!("{src:?} and {dst:?} differ at byte {idx}");
    }
    Ok(())
}
