//! Story file formats and their classification.
//!
//! Classification works on file names and raw bytes only; reading files is
//! left to the infrastructure layer.

use super::InterpreterKind;

/// A story file format understood by one of the interpreters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameFormat {
    /// Raw Glulx story.
    Ulx,
    /// Blorb container with a GLUL executable.
    Gblorb,
    /// Raw Z-code story, versions 1 to 8.
    ZCode(u8),
    /// Blorb container with a ZCOD executable.
    Zblorb,
}

impl std::fmt::Display for GameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameFormat::Ulx => f.write_str("ulx"),
            GameFormat::Gblorb => f.write_str("gblorb"),
            GameFormat::ZCode(version) => write!(f, "z{}", version),
            GameFormat::Zblorb => f.write_str("zblorb"),
        }
    }
}

impl GameFormat {
    /// Every extension a game file may be stored under, in lookup priority order.
    pub const GAME_FILE_EXTENSIONS: [&'static str; 11] = [
        "ulx", "gblorb", "z1", "z2", "z3", "z4", "z5", "z6", "z7", "z8", "zblorb",
    ];

    pub fn interpreter_kind(&self) -> InterpreterKind {
        match self {
            GameFormat::Ulx | GameFormat::Gblorb => InterpreterKind::Glulx,
            GameFormat::ZCode(_) | GameFormat::Zblorb => InterpreterKind::ZMachine,
        }
    }

    pub fn is_zcode(&self) -> bool {
        self.interpreter_kind() == InterpreterKind::ZMachine
    }

    /// The file extension a game of this format is stored under.
    pub fn extension(&self) -> String {
        self.to_string()
    }

    /// Classifies by extension alone.
    ///
    /// Returns `Ok(None)` for the generic Blorb extensions, whose executable type
    /// can only be learned from the container itself.
    pub fn from_extension(ext: &str) -> Result<Option<Self>, String> {
        let lower = ext.to_ascii_lowercase();
        let format = match lower.as_str() {
            "ulx" => GameFormat::Ulx,
            "gblorb" | "glb" => GameFormat::Gblorb,
            "zblorb" | "zlb" => GameFormat::Zblorb,
            "blorb" | "blb" => return Ok(None),
            z if z.len() == 2 && z.starts_with('z') => match z.as_bytes()[1] {
                v @ b'1'..=b'8' => GameFormat::ZCode(v - b'0'),
                _ => return Err(format!("unknown extension '.{}'", ext)),
            },
            _ => return Err(format!("unknown extension '.{}'", ext)),
        };
        Ok(Some(format))
    }

    /// Classifies a story by its leading bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"Glul") {
            return Some(GameFormat::Ulx);
        }
        if data.len() >= 12 && data.starts_with(b"FORM") {
            if &data[8..12] != b"IFRS" {
                return None;
            }
            return match blorb_executable(data) {
                Some((BlorbExec::Zcode, _)) => Some(GameFormat::Zblorb),
                // Blorbs without a readable exec index are treated as Glulx.
                _ => Some(GameFormat::Gblorb),
            };
        }
        let version = *data.first()?;
        if (1..=8).contains(&version) && ZCodeHeader::parse(data).is_some() {
            return Some(GameFormat::ZCode(version));
        }
        None
    }
}

/// Executable chunk types a Blorb may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlorbExec {
    Glulx,
    Zcode,
}

/// Finds the executable resource of a Blorb file.
///
/// Returns the executable type and the absolute offset of its chunk header.
pub fn blorb_executable(data: &[u8]) -> Option<(BlorbExec, usize)> {
    // FORM <len> IFRS, then the resource index must be the first chunk.
    let ridx = data.get(12..20)?;
    if &ridx[0..4] != b"RIdx" {
        return None;
    }
    let count = read_u32(data, 20)? as usize;
    for i in 0..count {
        let entry = 24 + i * 12;
        let usage = data.get(entry..entry + 4)?;
        if usage != b"Exec" {
            continue;
        }
        let start = read_u32(data, entry + 8)? as usize;
        let exec = match data.get(start..start + 4)? {
            b"GLUL" => BlorbExec::Glulx,
            b"ZCOD" => BlorbExec::Zcode,
            _ => return None,
        };
        return Some((exec, start));
    }
    None
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// The identifying fields of a Z-code story header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZCodeHeader {
    pub version: u8,
    pub release: u16,
    pub serial: String,
    pub checksum: u16,
}

impl ZCodeHeader {
    const HEADER_LEN: usize = 0x40;

    /// Parses a header from the start of `data`.
    ///
    /// The serial (six bytes at offset 18) must be printable ASCII; this is
    /// what tells a Z-code file apart from arbitrary bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::HEADER_LEN {
            return None;
        }
        let version = data[0];
        if !(1..=8).contains(&version) {
            return None;
        }
        let serial = &data[18..24];
        if !serial.iter().all(|b| b.is_ascii_graphic()) {
            return None;
        }
        Some(Self {
            version,
            release: read_u16(data, 2)?,
            serial: String::from_utf8_lossy(serial).into_owned(),
            checksum: read_u16(data, 0x1c)?,
        })
    }

    /// Parses the header of a raw story or of the ZCOD chunk inside a Blorb.
    pub fn locate(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"FORM") {
            match blorb_executable(data)? {
                (BlorbExec::Zcode, start) => Self::parse(data.get(start + 8..)?),
                (BlorbExec::Glulx, _) => None,
            }
        } else {
            Self::parse(data)
        }
    }

    /// Identifier unique to one release of one story.
    pub fn story_id(&self) -> String {
        format!("{}-{}-{:04x}", self.release, self.serial, self.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zcode(version: u8, serial: &[u8; 6]) -> Vec<u8> {
        let mut data = vec![0u8; 64];
        data[0] = version;
        data[2..4].copy_from_slice(&88u16.to_be_bytes());
        data[18..24].copy_from_slice(serial);
        data[0x1c..0x1e].copy_from_slice(&0xa129u16.to_be_bytes());
        data
    }

    fn blorb_with(exec: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        // FORM(4)+size(4)+IFRS(4)+RIdx(4)+size(4)+count(4)+entry(12) = 36
        let mut ridx = Vec::new();
        ridx.extend_from_slice(&1u32.to_be_bytes());
        ridx.extend_from_slice(b"Exec");
        ridx.extend_from_slice(&0u32.to_be_bytes());
        ridx.extend_from_slice(&36u32.to_be_bytes());
        let mut form = Vec::new();
        form.extend_from_slice(b"IFRS");
        form.extend_from_slice(b"RIdx");
        form.extend_from_slice(&(ridx.len() as u32).to_be_bytes());
        form.extend_from_slice(&ridx);
        form.extend_from_slice(exec);
        form.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        form.extend_from_slice(payload);
        let mut blorb = b"FORM".to_vec();
        blorb.extend_from_slice(&(form.len() as u32).to_be_bytes());
        blorb.extend_from_slice(&form);
        blorb
    }

    #[test]
    fn test_detect_glulx() {
        let mut data = b"Glul".to_vec();
        data.extend_from_slice(&[0; 100]);
        assert_eq!(GameFormat::detect(&data), Some(GameFormat::Ulx));
    }

    #[test]
    fn test_detect_blorbs() {
        assert_eq!(
            GameFormat::detect(&blorb_with(b"ZCOD", &zcode(5, b"250101"))),
            Some(GameFormat::Zblorb)
        );
        assert_eq!(
            GameFormat::detect(&blorb_with(b"GLUL", b"Glul")),
            Some(GameFormat::Gblorb)
        );
        let mut plain = b"FORM\0\0\0\0IFRS".to_vec();
        plain.extend_from_slice(&[0; 64]);
        assert_eq!(GameFormat::detect(&plain), Some(GameFormat::Gblorb));
        let mut aiff = b"FORM\0\0\0\0AIFF".to_vec();
        aiff.extend_from_slice(&[0; 64]);
        assert_eq!(GameFormat::detect(&aiff), None);
        assert_eq!(GameFormat::detect(b"FORM\0\0"), None);
    }

    #[test]
    fn test_detect_zcode() {
        assert_eq!(GameFormat::detect(&zcode(5, b"250101")), Some(GameFormat::ZCode(5)));
        assert_eq!(GameFormat::detect(&zcode(3, b"840726")), Some(GameFormat::ZCode(3)));
        assert_eq!(GameFormat::detect(&zcode(5, &[0; 6])), None);
        assert_eq!(GameFormat::detect(&zcode(5, b"250101")[..10]), None);
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(GameFormat::detect(b"PK\x03\x04"), None);
        assert_eq!(GameFormat::detect(b""), None);
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(GameFormat::from_extension("z5"), Ok(Some(GameFormat::ZCode(5))));
        assert_eq!(GameFormat::from_extension("GBLORB"), Ok(Some(GameFormat::Gblorb)));
        assert_eq!(GameFormat::from_extension("ulx"), Ok(Some(GameFormat::Ulx)));
        assert_eq!(GameFormat::from_extension("zblorb"), Ok(Some(GameFormat::Zblorb)));
        assert_eq!(GameFormat::from_extension("blb"), Ok(None));
        assert!(GameFormat::from_extension("txt").is_err());
        assert!(GameFormat::from_extension("z9").is_err());
    }

    #[test]
    fn test_extension_round_trip() {
        assert_eq!(GameFormat::ZCode(8).extension(), "z8");
        assert_eq!(GameFormat::Zblorb.extension(), "zblorb");
        assert!(GameFormat::ZCode(3).is_zcode());
        assert!(!GameFormat::Gblorb.is_zcode());
    }

    #[test]
    fn test_story_id_from_blorb() {
        let blorb = blorb_with(b"ZCOD", &zcode(5, b"250101"));
        let header = ZCodeHeader::locate(&blorb).unwrap();
        assert_eq!(header.story_id(), "88-250101-a129");
        assert_eq!(ZCodeHeader::locate(&blorb_with(b"GLUL", b"Glul")), None);
    }
}
