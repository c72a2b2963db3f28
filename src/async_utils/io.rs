//! I/O utilities.
//!
//! Reading JSON or TOML configuration files, and writing our outputs to either
//! a file or standard output.

use tokio::{
    fs::{self, File},
    io::{AsyncWrite, AsyncWriteExt as _, BufWriter},
};

use crate::prelude::*;

/// Read TOML or JSON from a file.
///
/// Files ending in `.json` are parsed as JSON. Everything else is parsed as
/// TOML, unless it starts with `{`.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    let is_json_like =
        path.extension().is_some_and(|ext| ext == "json") || data.trim_start().starts_with('{');
    if is_json_like {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a string to either standard output or a file, adding a trailing
/// newline if it doesn't already have one.
pub async fn write_output_text(path: Option<&Path>, text: &str) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    writer
        .write_all(text.as_bytes())
        .await
        .context("Failed to write output")?;
    if !text.ends_with('\n') {
        writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline to output")?;
    }
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Write a value as pretty-printed JSON to either standard output or a file.
pub async fn write_output_json<T>(path: Option<&Path>, value: &T) -> Result<()>
where
    T: Serialize,
{
    let json =
        serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
    write_output_text(path, &json).await
}
