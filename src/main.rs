fn main() -> anyhow::Result<()> {
    nano_imager::run()?;
    Ok(())
}
