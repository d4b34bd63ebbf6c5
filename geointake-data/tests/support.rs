//! Shared helpers for the ingestion behaviour tests.

use std::{fs, future::Future, io::Write, path::Path};

use geointake_data::ToolCommand;
use zip::write::SimpleFileOptions;

/// Drive a future to completion on a single-threaded runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| panic!("failed to build test runtime: {err}"))
        .block_on(future)
}

/// Write a zip archive holding `entries` at `path`.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path)
        .unwrap_or_else(|err| panic!("failed to create archive {path:?}: {err}"));
    let mut writer = zip::ZipWriter::new(file);
    for (name, contents) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap_or_else(|err| panic!("failed to start entry {name}: {err}"));
        writer
            .write_all(contents)
            .unwrap_or_else(|err| panic!("failed to write entry {name}: {err}"));
    }
    writer
        .finish()
        .unwrap_or_else(|err| panic!("failed to finish archive {path:?}: {err}"));
}

/// Build a tool command that runs `body` as a shell script.
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> ToolCommand {
    let script = dir.join(format!("fake-{name}.sh"));
    fs::write(&script, body)
        .unwrap_or_else(|err| panic!("failed to write fake {name}: {err}"));
    ToolCommand::new(name, "sh").with_prefix_arg(script)
}
