//! Extraction pipeline: dispatch, preconditions and telemetry emission.
//!
//! [`extract`] is the single entry point: it caps the input, captures the
//! detection header, picks a driver by magic bytes and runs it. Telemetry
//! is submitted exactly once per run, on success and failure alike.

pub(crate) mod decompress;
pub mod engine;
pub(crate) mod spool;

use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::error::ExtractError;
use crate::error::Quota;
use crate::error::Result;
use crate::formats::FileType;
use crate::formats::MAX_HEADER_LENGTH;
use crate::formats::detect;
use crate::formats::rar::RarSource;
use crate::formats::sevenz::SevenZSource;
use crate::formats::tar::TarSource;
use crate::formats::zip::ZipSource;
use crate::io::HeaderReader;
use crate::io::LimitedReader;
use crate::io::limited;
use crate::target::Target;
use crate::target::is_not_found;
use crate::telemetry;
use crate::telemetry::Telemetry;

use engine::Walker;

/// Extracts an archive or compressed stream from `src` into `dest` on
/// `target`.
///
/// The input type is detected by magic bytes; see
/// [`FileType`](crate::FileType) for the recognised formats. The
/// configured telemetry hook is invoked exactly once, whether the run
/// succeeds or fails; partial side effects of a failed run remain on the
/// target.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use unpax::{extract, Config};
/// use unpax::target::MemoryFs;
///
/// # fn main() -> unpax::Result<()> {
/// let mut builder = tar::Builder::new(Vec::new());
/// let mut header = tar::Header::new_gnu();
/// header.set_size(5);
/// header.set_mode(0o644);
/// header.set_cksum();
/// builder.append_data(&mut header, "hello.txt", &b"hello"[..]).unwrap();
/// let archive = builder.into_inner().unwrap();
///
/// let fs = MemoryFs::new();
/// extract(&archive[..], Path::new("."), &fs, &Config::default())?;
/// assert_eq!(fs.read_file("hello.txt")?, b"hello");
/// # Ok(())
/// # }
/// ```
pub fn extract<R: Read>(src: R, dest: &Path, target: &dyn Target, config: &Config) -> Result<()> {
    extract_named(src, dest, target, config, None)
}

/// Extracts an archive file from disk, feeding its filename into
/// output-name derivation for single-stream decompression.
pub fn extract_file(
    archive: &Path,
    dest: &Path,
    target: &dyn Target,
    config: &Config,
) -> Result<()> {
    let file = File::open(archive)?;
    let name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    extract_named(BufReader::new(file), dest, target, config, name.as_deref())
}

fn extract_named<R: Read>(
    src: R,
    dest: &Path,
    target: &dyn Target,
    config: &Config,
    input_name: Option<&str>,
) -> Result<()> {
    let start = Instant::now();
    let mut data = Telemetry::new();

    let reader = LimitedReader::new(src, config.max_input_size);
    let counter = reader.counter();

    let result = run_pipeline(reader, dest, target, config, &mut data, input_name)
        .map_err(map_input_limit);

    if let Err(err) = &result {
        let message = err.to_string();
        if data.last_extraction_error.is_empty() {
            data.record_error(message);
        } else {
            data.last_extraction_error = message;
        }
    }
    data.input_size = i64::try_from(counter.get()).unwrap_or(i64::MAX);
    data.extraction_duration = start.elapsed();
    telemetry::submit(config, &mut data);

    result
}

fn run_pipeline<R: Read>(
    reader: LimitedReader<R>,
    dest: &Path,
    target: &dyn Target,
    config: &Config,
    data: &mut Telemetry,
    input_name: Option<&str>,
) -> Result<()> {
    let header = HeaderReader::new(reader, MAX_HEADER_LENGTH)?;
    let Some(kind) = detect(header.peek()) else {
        return Err(ExtractError::UnsupportedArchiveType);
    };
    tracing::debug!(format = kind.extension(), "detected input format");
    if config.cancel.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }

    if kind.is_archive() {
        data.extracted_type = kind.extension().to_owned();
        ensure_destination(target, dest, config)?;
    }

    match kind {
        FileType::Tar => {
            let mut archive = tar::Archive::new(header);
            let mut source = TarSource::new(&mut archive)?;
            Walker::new(target, dest, config, data).run(&mut source)
        }
        FileType::Zip => {
            let spooled = spool::spool(header, config.cache_in_memory)?;
            let mut source = ZipSource::new(spooled)?;
            Walker::new(target, dest, config, data).run(&mut source)
        }
        FileType::SevenZip => {
            let spooled = spool::spool(header, config.cache_in_memory)?;
            let mut source = SevenZSource::new(spooled)?;
            Walker::new(target, dest, config, data).run(&mut source)
        }
        FileType::Rar => {
            // The rar library opens archives by path; the guard removes
            // the temp file when the driver is done, success or not.
            let tmp = spool::spool_to_path(header)?;
            let mut source = RarSource::open(tmp.path())?;
            Walker::new(target, dest, config, data).run(&mut source)
        }
        _ => decompress::run(kind, header, dest, target, config, data, input_name),
    }
}

/// Checks the destination directory precondition, creating it when
/// `create_destination` is set.
pub(crate) fn ensure_destination(
    target: &dyn Target,
    dest: &Path,
    config: &Config,
) -> Result<()> {
    match target.lstat(dest) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ExtractError::Config(format!(
            "destination is not a directory: {}",
            dest.display()
        ))),
        Err(ref err) if is_not_found(err) => {
            if config.create_destination {
                target.create_dir(dest, config.custom_create_dir_mode)
            } else {
                Err(ExtractError::Config(format!(
                    "destination directory does not exist: {}",
                    dest.display()
                )))
            }
        }
        Err(err) => Err(err),
    }
}

/// Converts a tripped input-limit read error into its quota form.
fn map_input_limit(err: ExtractError) -> ExtractError {
    let limit = ExtractError::QuotaExceeded {
        quota: Quota::InputSize,
    };
    match &err {
        ExtractError::Io(io_err) if limited::is_input_limit(io_err) => limit,
        ExtractError::InvalidArchive(msg) | ExtractError::DecompressionStart(msg)
            if msg.contains("max input size exceeded") =>
        {
            limit
        }
        _ => err,
    }
}
