use anyhow::Result;

fn main() -> Result<()> {
    if let Err(err) = scribe::run() {
        eprintln!("{}", serde_json::to_string_pretty(&err.envelope())?);
        std::process::exit(1);
    }
    Ok(())
}
