#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = visual_grader::run().await {
        eprintln!("visual-grader fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
