//! Driver for the external feature-engineering program
//!
//! The program is invoked as
//! `<interpreter> <script> --input <snapshot> --output <dir> --cutoff <date>`
//! and must leave `train_data.csv` (and optionally `test_data.csv`) in the
//! output directory.

use crate::error::{AppError, Result};
use crate::models::DataType;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument, Span};

const LINE_BUFFER_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Interpreter executable, e.g. `python`
    pub interpreter: PathBuf,
    /// Script passed as the interpreter's first argument
    pub script: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExternalProcessor {
    config: ProcessorConfig,
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

impl ExternalProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    /// Run the program to completion, streaming its output to the log.
    ///
    /// The child is never killed from here: cancellation waits for it to exit.
    pub async fn run(&self, input_path: &Path, output_dir: &Path, cutoff_date: &str) -> Result<()> {
        info!(
            interpreter = %self.config.interpreter.display(),
            script = %self.config.script.display(),
            input = %input_path.display(),
            output = %output_dir.display(),
            cutoff = %cutoff_date,
            "Running feature-engineering program"
        );

        let mut child = Command::new(&self.config.interpreter)
            .arg(&self.config.script)
            .arg("--input")
            .arg(input_path)
            .arg("--output")
            .arg(output_dir)
            .arg("--cutoff")
            .arg(cutoff_date)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()?;

        let stdout = child.stdout.take().map(|s| drain_lines(s, OutputStream::Stdout));
        let stderr = child.stderr.take().map(|s| drain_lines(s, OutputStream::Stderr));

        let status = child.wait().await?;

        for reader in [stdout, stderr].into_iter().flatten() {
            if let Err(e) = reader.await {
                warn!(error = %e, "Output reader task failed");
            }
        }

        if !status.success() {
            return Err(AppError::ExternalProgram {
                exit_code: status.code(),
            });
        }

        let train_path = output_dir.join(DataType::Train.artifact_file_name());
        if !tokio::fs::try_exists(&train_path).await? {
            return Err(AppError::ArtifactMissing(train_path));
        }

        info!(output = %output_dir.display(), "Feature-engineering program finished");
        Ok(())
    }
}

fn drain_lines<R>(reader: R, stream: OutputStream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(
        async move {
            let mut reader = BufReader::with_capacity(LINE_BUFFER_CAPACITY, reader);
            let mut buf = Vec::with_capacity(LINE_BUFFER_CAPACITY);
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end();
                        match stream {
                            OutputStream::Stdout => info!(stream = stream.as_str(), "{}", line),
                            OutputStream::Stderr => warn!(stream = stream.as_str(), "{}", line),
                        }
                    }
                    Err(e) => {
                        let stream = stream.as_str();
                        warn!(stream, error = %e, "Failed to read program output");
                        // Keep the pipe open so the child never sees EPIPE
                        let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                        if let Err(e) = discarded {
                            warn!(stream, error = %e, "Failed to discard program output");
                        }
                        break;
                    }
                }
            }
        }
        .instrument(Span::current()),
    )
}
