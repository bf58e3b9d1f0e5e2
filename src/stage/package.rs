// ABOUTME: Packages a model directory into a deterministic tar.gz artifact.
// ABOUTME: Layout: model/ contents, optional requirements.txt, generated inference.py.

use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;

/// Directory inside the archive holding the model files.
const MODEL_PREFIX: &str = "model";

/// Serving handler placed at the archive root.
pub const INFERENCE_SCRIPT: &str = r#"import json
import os
import pickle


def model_fn(model_dir):
    with open(os.path.join(model_dir, "model", "model.pkl"), "rb") as f:
        return pickle.load(f)


def input_fn(body, content_type):
    if content_type == "application/json":
        return json.loads(body)["instances"]
    raise ValueError(f"unsupported content type: {content_type}")


def predict_fn(data, model):
    return model.predict(data)


def output_fn(prediction, accept):
    return json.dumps({"predictions": prediction.tolist()})
"#;

/// A packaged artifact on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    pub path: PathBuf,
    /// Hex SHA-256 of the archive bytes.
    pub sha256: String,
    pub size: u64,
}

fn header(entry_type: EntryType, size: u64, mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

fn append_dir<W: io::Write>(builder: &mut Builder<W>, path: &Path) -> io::Result<()> {
    let mut header = header(EntryType::Directory, 0, 0o755);
    builder.append_data(&mut header, path, io::empty())
}

fn append_file<W: io::Write, R: Read>(
    builder: &mut Builder<W>,
    path: &Path,
    size: u64,
    data: R,
) -> io::Result<()> {
    let mut header = header(EntryType::Regular, size, 0o644);
    builder.append_data(&mut header, path, data)
}

/// Hex SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Package `model_dir` into the archive at `output`.
///
/// Entries are sorted and carry zeroed timestamps and ownership, so the same
/// inputs always produce byte-identical output and the same hash. Symlinks
/// are not followed.
pub fn package_model(
    model_dir: &Path,
    requirements: &[String],
    output: &Path,
) -> io::Result<PackagedArtifact> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let encoder = GzBuilder::new()
        .mtime(0)
        .write(File::create(output)?, Compression::default());
    let mut builder = Builder::new(encoder);

    append_dir(&mut builder, Path::new(MODEL_PREFIX))?;
    for entry in WalkDir::new(model_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(model_dir)
            .map_err(io::Error::other)?;
        let archive_path = Path::new(MODEL_PREFIX).join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            append_dir(&mut builder, &archive_path)?;
        } else if file_type.is_file() {
            let file = File::open(entry.path())?;
            let size = file.metadata()?.len();
            append_file(&mut builder, &archive_path, size, file)?;
        } else {
            tracing::warn!("Skipping {} (not a regular file)", entry.path().display());
        }
    }

    if !requirements.is_empty() {
        let body: String = requirements.iter().map(|p| format!("{p}\n")).collect();
        append_file(
            &mut builder,
            Path::new("requirements.txt"),
            body.len() as u64,
            body.as_bytes(),
        )?;
    }

    append_file(
        &mut builder,
        Path::new("inference.py"),
        INFERENCE_SCRIPT.len() as u64,
        INFERENCE_SCRIPT.as_bytes(),
    )?;

    let file = builder.into_inner()?.finish()?;
    file.sync_all()?;
    let size = file.metadata()?.len();

    Ok(PackagedArtifact {
        path: output.to_path_buf(),
        sha256: hash_file(output)?,
        size,
    })
}
