use anyhow::{Result, anyhow};
use copypasta::{ClipboardContext, ClipboardProvider};

/// Put `text` on the system clipboard
pub fn copy(text: &str) -> Result<()> {
    let mut ctx = ClipboardContext::new().map_err(|e| anyhow!("{}", e))?;
    ctx.set_contents(text.to_owned()).map_err(|e| anyhow!("{}", e))?;
    Ok(())
}
