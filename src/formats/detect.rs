//! Format detection by magic bytes on a replayable prefix.
//!
//! Each format declares an offset and a set of candidate byte strings. A
//! detector matches iff the prefix is long enough and one candidate equals
//! the bytes at the offset. Detectors are pure; dispatch walks
//! [`FileType::ALL`] in definition order and the first match wins.

/// Input types the dispatcher recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// USTAR-family tar archive (magic at offset 257).
    Tar,
    /// ZIP archive.
    Zip,
    /// 7z archive.
    SevenZip,
    /// RAR archive (v4 and v5 signatures).
    Rar,
    /// Gzip stream.
    Gzip,
    /// Bzip2 stream (`BZh1`..`BZh9`).
    Bzip2,
    /// XZ stream.
    Xz,
    /// Zstandard stream.
    Zstd,
    /// Brotli stream (framed signature).
    Brotli,
    /// LZ4 frame stream.
    Lz4,
    /// Snappy frame stream.
    Snappy,
    /// Zlib stream (`0x78` + common flag bytes).
    Zlib,
}

/// Tar header magic candidates, at offset 257.
const TAR_MAGICS: &[&[u8]] = &[b"ustar\x00tar\x00", b"ustar\x0000", b"ustar  \x00"];

const ZIP_MAGICS: &[&[u8]] = &[b"PK\x03\x04"];
const SEVENZ_MAGICS: &[&[u8]] = &[&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]];
const RAR_MAGICS: &[&[u8]] = &[
    &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00],
    &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00],
];
const GZIP_MAGICS: &[&[u8]] = &[&[0x1F, 0x8B]];
const BZIP2_MAGICS: &[&[u8]] = &[
    b"BZh1", b"BZh2", b"BZh3", b"BZh4", b"BZh5", b"BZh6", b"BZh7", b"BZh8", b"BZh9",
];
const XZ_MAGICS: &[&[u8]] = &[&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]];
const ZSTD_MAGICS: &[&[u8]] = &[&[0x28, 0xB5, 0x2F, 0xFD]];
const BROTLI_MAGICS: &[&[u8]] = &[&[0xCE, 0xB2, 0xCF, 0x81]];
const LZ4_MAGICS: &[&[u8]] = &[&[0x04, 0x22, 0x4D, 0x18]];
const SNAPPY_MAGICS: &[&[u8]] = &[&[0xFF, 0x06, 0x00, 0x00, 0x73, 0x4E, 0x61, 0x50, 0x70, 0x59]];
const ZLIB_MAGICS: &[&[u8]] = &[
    &[0x78, 0x01],
    &[0x78, 0x5E],
    &[0x78, 0x9C],
    &[0x78, 0xDA],
    &[0x78, 0x20],
    &[0x78, 0x7D],
    &[0x78, 0xBB],
    &[0x78, 0xF9],
];

impl FileType {
    /// Detector registry in dispatch order.
    pub const ALL: [Self; 12] = [
        Self::Tar,
        Self::Zip,
        Self::SevenZip,
        Self::Rar,
        Self::Gzip,
        Self::Bzip2,
        Self::Xz,
        Self::Zstd,
        Self::Brotli,
        Self::Lz4,
        Self::Snappy,
        Self::Zlib,
    ];

    /// Magic offset and candidate byte strings for this format.
    const fn signatures(self) -> (usize, &'static [&'static [u8]]) {
        match self {
            Self::Tar => (257, TAR_MAGICS),
            Self::Zip => (0, ZIP_MAGICS),
            Self::SevenZip => (0, SEVENZ_MAGICS),
            Self::Rar => (0, RAR_MAGICS),
            Self::Gzip => (0, GZIP_MAGICS),
            Self::Bzip2 => (0, BZIP2_MAGICS),
            Self::Xz => (0, XZ_MAGICS),
            Self::Zstd => (0, ZSTD_MAGICS),
            Self::Brotli => (0, BROTLI_MAGICS),
            Self::Lz4 => (0, LZ4_MAGICS),
            Self::Snappy => (0, SNAPPY_MAGICS),
            Self::Zlib => (0, ZLIB_MAGICS),
        }
    }

    /// Whether `data` carries this format's magic bytes.
    #[must_use]
    pub fn matches(self, data: &[u8]) -> bool {
        let (offset, magics) = self.signatures();
        magics.iter().any(|magic| {
            data.len() >= offset + magic.len() && &data[offset..offset + magic.len()] == *magic
        })
    }

    /// Canonical file extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
            Self::SevenZip => "7z",
            Self::Rar => "rar",
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
            Self::Zstd => "zst",
            Self::Brotli => "br",
            Self::Lz4 => "lz4",
            Self::Snappy => "sz",
            Self::Zlib => "zz",
        }
    }

    /// Whether this format is a multi-entry archive (as opposed to a
    /// single compressed stream).
    #[must_use]
    pub const fn is_archive(self) -> bool {
        matches!(self, Self::Tar | Self::Zip | Self::SevenZip | Self::Rar)
    }
}

/// Bytes every driver dispatches on: max over all detectors of
/// offset + magic length.
pub const MAX_HEADER_LENGTH: usize = max_header_length();

const fn max_header_length() -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < FileType::ALL.len() {
        let (offset, magics) = FileType::ALL[i].signatures();
        let mut j = 0;
        while j < magics.len() {
            let need = offset + magics[j].len();
            if need > max {
                max = need;
            }
            j += 1;
        }
        i += 1;
    }
    max
}

/// Picks the first registered format whose magic matches `data`.
#[must_use]
pub fn detect(data: &[u8]) -> Option<FileType> {
    FileType::ALL.into_iter().find(|t| t.matches(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tar_prefix() -> Vec<u8> {
        let mut data = vec![0u8; 512];
        data[257..257 + 8].copy_from_slice(b"ustar\x0000");
        data
    }

    #[test]
    fn test_detect_tar_at_offset() {
        assert_eq!(detect(&tar_prefix()), Some(FileType::Tar));
    }

    #[test]
    fn test_detect_tar_gnu_magic() {
        let mut data = vec![0u8; 512];
        data[257..257 + 8].copy_from_slice(b"ustar  \x00");
        assert_eq!(detect(&data), Some(FileType::Tar));
    }

    #[test]
    fn test_short_prefix_does_not_match_tar() {
        assert!(!FileType::Tar.matches(&[0u8; 100]));
    }

    #[test]
    fn test_detect_zip() {
        assert_eq!(detect(b"PK\x03\x04rest"), Some(FileType::Zip));
    }

    #[test]
    fn test_detect_sevenz() {
        assert_eq!(
            detect(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00]),
            Some(FileType::SevenZip)
        );
    }

    #[test]
    fn test_detect_rar_both_versions() {
        assert_eq!(
            detect(&[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00]),
            Some(FileType::Rar)
        );
        assert_eq!(
            detect(&[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00]),
            Some(FileType::Rar)
        );
    }

    #[test]
    fn test_detect_gzip() {
        assert_eq!(detect(&[0x1F, 0x8B, 0x08]), Some(FileType::Gzip));
    }

    #[test]
    fn test_detect_bzip2_all_levels() {
        for level in b'1'..=b'9' {
            let data = [b'B', b'Z', b'h', level];
            assert_eq!(detect(&data), Some(FileType::Bzip2), "level {level}");
        }
        assert_eq!(detect(b"BZh0"), None);
    }

    #[test]
    fn test_detect_xz() {
        assert_eq!(
            detect(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]),
            Some(FileType::Xz)
        );
    }

    #[test]
    fn test_detect_zstd() {
        assert_eq!(detect(&[0x28, 0xB5, 0x2F, 0xFD]), Some(FileType::Zstd));
    }

    #[test]
    fn test_detect_brotli() {
        assert_eq!(detect(&[0xCE, 0xB2, 0xCF, 0x81]), Some(FileType::Brotli));
    }

    #[test]
    fn test_detect_lz4() {
        assert_eq!(detect(&[0x04, 0x22, 0x4D, 0x18]), Some(FileType::Lz4));
    }

    #[test]
    fn test_detect_snappy() {
        assert_eq!(
            detect(&[0xFF, 0x06, 0x00, 0x00, 0x73, 0x4E, 0x61, 0x50, 0x70, 0x59]),
            Some(FileType::Snappy)
        );
    }

    #[test]
    fn test_detect_zlib_flag_bytes() {
        for second in [0x01, 0x5E, 0x9C, 0xDA, 0x20, 0x7D, 0xBB, 0xF9] {
            assert_eq!(detect(&[0x78, second]), Some(FileType::Zlib));
        }
        assert_eq!(detect(&[0x78, 0x00]), None);
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(detect(b"plain text"), None);
        assert_eq!(detect(&[]), None);
    }

    #[test]
    fn test_max_header_length_covers_tar() {
        // Longest requirement is the tar magic at offset 257.
        assert_eq!(MAX_HEADER_LENGTH, 257 + 10);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(FileType::Gzip.extension(), "gz");
        assert_eq!(FileType::SevenZip.extension(), "7z");
        assert_eq!(FileType::Snappy.extension(), "sz");
        assert_eq!(FileType::Zlib.extension(), "zz");
    }

    #[test]
    fn test_archive_classification() {
        assert!(FileType::Tar.is_archive());
        assert!(FileType::Rar.is_archive());
        assert!(!FileType::Gzip.is_archive());
        assert!(!FileType::Zstd.is_archive());
    }
}
