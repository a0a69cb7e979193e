use std::fs::File;
use std::io::Read;
use std::path::Path;

const HEADER_LEN: usize = 64;

/// Guesses a file extension from content.
pub trait TypeSniffer {
    fn sniff(&self, path: &Path) -> Option<String>;
}

/// Magic-number detection over the first bytes of a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicSniffer;

impl TypeSniffer for MagicSniffer {
    fn sniff(&self, path: &Path) -> Option<String> {
        let mut buffer = [0u8; HEADER_LEN];
        let read = File::open(path)
            .and_then(|mut file| file.read(&mut buffer))
            .map_err(|e| tracing::debug!("cannot sniff {}: {}", path.display(), e))
            .ok()?;
        detect_by_magic(&buffer[..read]).map(str::to_string)
    }
}

pub fn detect_by_magic(data: &[u8]) -> Option<&'static str> {
    if data.is_empty() {
        return None;
    }

    if data.starts_with(b"\xFF\xD8\xFF") {
        return Some("jpg");
    }
    if data.starts_with(b"\x89PNG\r\n\x1A\n") {
        return Some("png");
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("gif");
    }
    if data.starts_with(b"RIFF") && data.len() >= 12 {
        match &data[8..12] {
            b"WEBP" => return Some("webp"),
            b"WAVE" => return Some("wav"),
            b"AVI " => return Some("avi"),
            _ => {}
        }
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some(iso_media_extension(&data[8..12]));
    }
    if data.starts_with(b"%PDF") {
        return Some("pdf");
    }
    if data.starts_with(b"OggS") {
        return Some("ogg");
    }
    if data.starts_with(b"fLaC") {
        return Some("flac");
    }
    if data.starts_with(b"#!AMR") {
        return Some("amr");
    }
    if data.starts_with(b"\x1A\x45\xDF\xA3") {
        return Some("webm");
    }
    if data.starts_with(b"ID3") {
        return Some("mp3");
    }
    if data.len() > 1 && data[0] == 0xFF && (data[1] & 0xF6) == 0xF0 {
        return Some("aac");
    }
    if data.len() > 1 && data[0] == 0xFF && (data[1] & 0xE0) == 0xE0 {
        return Some("mp3");
    }
    if data.starts_with(b"PK\x03\x04") {
        return Some("zip");
    }
    if data.starts_with(b"\x1F\x8B") {
        return Some("gz");
    }
    if data.starts_with(b"BEGIN:VCARD") {
        return Some("vcf");
    }

    None
}

fn iso_media_extension(brand: &[u8]) -> &'static str {
    match brand {
        b"qt  " => "mov",
        b"M4A " | b"M4B " => "m4a",
        b"heic" | b"heix" | b"mif1" | b"msf1" => "heic",
        b"avif" => "avif",
        b if b.starts_with(b"3gp") || b.starts_with(b"3g2") => "3gp",
        _ => "mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detects_common_media() {
        assert_eq!(detect_by_magic(b"\xFF\xD8\xFF\xE0\x00\x10JFIF"), Some("jpg"));
        assert_eq!(detect_by_magic(b"\x89PNG\r\n\x1A\n\x00"), Some("png"));
        assert_eq!(detect_by_magic(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some("webp"));
        assert_eq!(detect_by_magic(b"\x00\x00\x00\x18ftypmp42\x00"), Some("mp4"));
        assert_eq!(detect_by_magic(b"\x00\x00\x00\x14ftypqt  \x00"), Some("mov"));
        assert_eq!(detect_by_magic(b"\x00\x00\x00\x1cftypM4A \x00"), Some("m4a"));
        assert_eq!(detect_by_magic(b"OggS\x00\x02"), Some("ogg"));
        assert_eq!(detect_by_magic(b"%PDF-1.7"), Some("pdf"));
    }

    #[test]
    fn unknown_content_is_undetermined() {
        assert_eq!(detect_by_magic(b"just some text"), None);
        assert_eq!(detect_by_magic(b""), None);
    }

    #[test]
    fn sniff_reads_file_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uid001");
        std::fs::write(&path, b"\xFF\xD8\xFF\xDBrest").unwrap();

        assert_eq!(MagicSniffer.sniff(&path), Some("jpg".to_string()));
        assert_eq!(MagicSniffer.sniff(&dir.path().join("missing")), None);
    }
}
