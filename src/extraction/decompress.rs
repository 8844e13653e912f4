//! Single-stream decompression pipeline.
//!
//! A decompressor is wrapped over the (already input-limited) stream and
//! its decompressed prefix inspected: when it carries a tar header and
//! the recursive-tar rule is enabled, the tar walk engine takes over and
//! the telemetry type becomes `tar.<ext>`. Otherwise one decompressed
//! file is written under a derived output name.

use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::ExtractError;
use crate::error::Result;
use crate::formats::FileType;
use crate::formats::MAX_HEADER_LENGTH;
use crate::formats::tar::TarSource;
use crate::io::HeaderReader;
use crate::security::Boundary;
use crate::security::names;
use crate::security::paths;
use crate::target::Target;
use crate::telemetry::Telemetry;

use super::engine::Walker;
use super::ensure_destination;

/// Output name used when neither the destination nor the input filename
/// yields a usable name.
pub(crate) const FALLBACK_NAME: &str = "unpax-decompressed-content";

/// Constructs the decompressor for a single-stream format.
fn open_decompressor<'r, R: Read + 'r>(kind: FileType, input: R) -> Result<Box<dyn Read + 'r>> {
    Ok(match kind {
        FileType::Gzip => Box::new(flate2::read::GzDecoder::new(input)),
        FileType::Zlib => Box::new(flate2::read::ZlibDecoder::new(input)),
        FileType::Bzip2 => Box::new(bzip2::read::BzDecoder::new(input)),
        FileType::Xz => Box::new(xz2::read::XzDecoder::new(input)),
        FileType::Zstd => Box::new(
            zstd::stream::read::Decoder::new(input)
                .map_err(|err| ExtractError::DecompressionStart(err.to_string()))?,
        ),
        FileType::Brotli => Box::new(brotli::Decompressor::new(input, 4096)),
        FileType::Lz4 => Box::new(lz4_flex::frame::FrameDecoder::new(input)),
        FileType::Snappy => Box::new(snap::read::FrameDecoder::new(input)),
        FileType::Tar | FileType::Zip | FileType::SevenZip | FileType::Rar => {
            return Err(ExtractError::UnsupportedArchiveType);
        }
    })
}

/// Runs the decompression pipeline for `kind` over `input`.
pub(crate) fn run<R: Read>(
    kind: FileType,
    input: R,
    dest: &Path,
    target: &dyn Target,
    config: &Config,
    telemetry: &mut Telemetry,
    input_name: Option<&str>,
) -> Result<()> {
    let ext = kind.extension();
    telemetry.extracted_type = ext.to_owned();

    if config.cancel.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }
    let decoder = open_decompressor(kind, input)?;
    let mut header = HeaderReader::new(decoder, MAX_HEADER_LENGTH)?;
    if config.cancel.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }

    if !config.no_untar_after_decompression && FileType::Tar.matches(header.peek()) {
        telemetry.extracted_type = format!("tar.{ext}");
        tracing::debug!(kind = ext, "decompressed stream contains a tar archive");
        ensure_destination(target, dest, config)?;
        let mut archive = tar::Archive::new(header);
        let mut source = TarSource::new(&mut archive)?;
        return Walker::new(target, dest, config, telemetry).run(&mut source);
    }

    let (dir, name) = derive_output_name(target, dest, input_name, ext);
    if config.create_destination {
        target.create_dir(&dir, config.custom_create_dir_mode)?;
    }
    let boundary = Boundary::new(target, &dir, config);
    let written = boundary.create_file(
        &name,
        &mut header,
        config.custom_decompress_file_mode,
        config.max_extraction_size,
    )?;
    telemetry.extraction_size += i64::try_from(written).unwrap_or(i64::MAX);
    telemetry.extracted_files += 1;
    Ok(())
}

/// Derives the output directory and filename for a decompressed stream.
///
/// Precedence: a destination naming a non-directory (existing or not)
/// wins; then the input filename with the codec extension stripped (or
/// `.decompressed` appended when nothing strips); then the fallback
/// constant. A derived name that fails validation falls back too.
fn derive_output_name(
    target: &dyn Target,
    dest: &Path,
    input_name: Option<&str>,
    ext: &str,
) -> (PathBuf, String) {
    let dest_str = dest.to_string_lossy();
    if !dest_str.is_empty() && dest_str != "." {
        let is_dir = target.lstat(dest).is_ok_and(|meta| meta.is_dir());
        if !is_dir {
            let dir = dest
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            let name = dest.file_name().map_or_else(
                || FALLBACK_NAME.to_owned(),
                |n| n.to_string_lossy().into_owned(),
            );
            return (dir, name);
        }
    }

    if let Some(input) = input_name.filter(|n| !n.is_empty()) {
        let base = paths::base(input);
        let mut name = base.to_owned();
        let suffix = format!(".{ext}");
        if name.len() > suffix.len()
            && name
                .to_ascii_lowercase()
                .ends_with(&suffix.to_ascii_lowercase())
        {
            name.truncate(name.len() - suffix.len());
        } else {
            name.push_str(".decompressed");
        }
        if names::check_name(&name).is_err() {
            return (dest.to_path_buf(), FALLBACK_NAME.to_owned());
        }
        return (dest.to_path_buf(), name);
    }

    (dest.to_path_buf(), FALLBACK_NAME.to_owned())
}
