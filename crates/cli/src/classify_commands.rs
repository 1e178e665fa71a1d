//! CLI command for classifying a saved envelope offline.

use std::{io::Read, path::PathBuf};

use {
    anyhow::Context,
    clap::Args,
    wxhook_messages::{ClassifierChain, Envelope},
};

#[derive(Args)]
pub struct ClassifyArgs {
    /// Envelope JSON file, or `-` for stdin.
    pub file: PathBuf,
    /// Print single-line JSON.
    #[arg(long)]
    pub compact: bool,
}

pub fn handle_classify(args: ClassifyArgs) -> anyhow::Result<()> {
    let raw = if args.file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.file)
            .with_context(|| format!("reading {}", args.file.display()))?
    };

    let envelope: Envelope = serde_json::from_str(&raw).context("parsing envelope JSON")?;
    let Some(record) = ClassifierChain::builtin().classify(&envelope) else {
        eprintln!("not classifiable: the envelope would be dropped");
        return Ok(());
    };

    let out = if args.compact {
        serde_json::to_string(&record)?
    } else {
        serde_json::to_string_pretty(&record)?
    };
    println!("{out}");
    Ok(())
}
