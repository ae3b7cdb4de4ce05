//! External metadata conversion.
//!
//! The converter is the `sfdx` CLI, treated as a black box: it takes a
//! staged source tree and a destination directory and produces a
//! deployable metadata tree containing a `package.xml`. The only piece
//! of converted output this crate interprets is that manifest, which
//! becomes the removal declaration of a deletions package. Calls block
//! with no timeout, like every collaborator invocation here.

use error_set::error_set;
use std::path::Path;
use std::process::Command;

/// Name of the removal-declaration artifact in the output directory.
pub const DESTRUCTIVE_CHANGES_FILE: &str = "destructiveChanges.xml";

/// Manifest file the converter writes at the top of its output.
pub const PACKAGE_MANIFEST_FILE: &str = "package.xml";

const CONVERTER_BIN: &str = "sfdx";

error_set! {
    /// Errors from the conversion collaborator
    ConvertError := {
        #[display("Failed to run {converter}: {message}")]
        ConverterFailed { converter: String, message: String },
        #[display("{converter} source conversion failed: {stderr}")]
        ConverterExit { converter: String, stderr: String },
        #[display("Converted output in {dir} contains no {file}")]
        MissingPackageManifest { dir: String, file: String },
        #[display("Failed to prepare conversion scratch directory: {message}")]
        ScratchDir { message: String },
        #[display("Failed to write {file}: {message}")]
        WriteArtifact { file: String, message: String },
    }
}

/// Convert a staged source tree into deployable metadata under `out`.
pub fn convert_source(staged: &Path, out: &Path) -> Result<(), ConvertError> {
    log::debug!(
        "Converting {} into {}",
        staged.display(),
        out.display()
    );
    let output = Command::new(CONVERTER_BIN)
        .arg("force:source:convert")
        .arg("--rootdir")
        .arg(staged)
        .arg("--outputdir")
        .arg(out)
        .output()
        .map_err(|e| ConvertError::ConverterFailed {
            converter: CONVERTER_BIN.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ConvertError::ConverterExit {
            converter: CONVERTER_BIN.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(())
}

/// Convert a removed-set staging tree and place its manifest in the
/// output directory as the removal declaration.
///
/// The conversion itself lands in a scratch directory that is dropped
/// afterwards; only `destructiveChanges.xml` survives.
pub fn convert_removals(staged: &Path, out: &Path) -> Result<(), ConvertError> {
    let scratch = tempfile::Builder::new()
        .prefix("sf-delta-destructive-")
        .tempdir()
        .map_err(|e| ConvertError::ScratchDir {
            message: e.to_string(),
        })?;

    convert_source(staged, scratch.path())?;
    extract_destructive_changes(scratch.path(), out)
}

/// Copy the converted `package.xml` into `out` under the fixed removal
/// declaration name.
pub fn extract_destructive_changes(converted: &Path, out: &Path) -> Result<(), ConvertError> {
    let manifest = converted.join(PACKAGE_MANIFEST_FILE);
    if !manifest.is_file() {
        return Err(ConvertError::MissingPackageManifest {
            dir: converted.display().to_string(),
            file: PACKAGE_MANIFEST_FILE.to_string(),
        });
    }

    let destination = out.join(DESTRUCTIVE_CHANGES_FILE);
    std::fs::copy(&manifest, &destination).map_err(|e| ConvertError::WriteArtifact {
        file: DESTRUCTIVE_CHANGES_FILE.to_string(),
        message: e.to_string(),
    })?;
    log::debug!("Wrote {}", destination.display());
    Ok(())
}
