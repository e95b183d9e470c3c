//! Embedded sample metadata extraction
//!
//! Decoders do not expose sampler chunks uniformly, so loop points, root
//! keys and wavetable descriptors are pulled straight out of the
//! container: RIFF `smpl`/`inst`/`clm ` chunks for WAV files, and the same
//! chunks stored as foreign-RIFF APPLICATION blocks for FLAC.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use wp_core::{InstrumentInfo, InstrumentLoop, WavetableInfo};

use crate::{FileError, FileResult};

/// Size of one loop record inside a `smpl` chunk.
const SMPL_LOOP_BYTES: usize = 24;

/// Offset of the first loop record inside a `smpl` chunk.
const SMPL_LOOPS_START: usize = 36;

/// Raw metadata chunk payloads found in a sample container.
#[derive(Debug, Default)]
pub struct MetadataReader {
    smpl: Option<Vec<u8>>,
    inst: Option<Vec<u8>>,
    clm: Option<Vec<u8>>,
}

impl MetadataReader {
    /// Scan `path` for metadata chunks.
    ///
    /// Files without any metadata chunks open fine; files that are neither
    /// RIFF nor FLAC containers are rejected.
    pub fn open(path: &Path) -> FileResult<Self> {
        let mut file = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        match &magic {
            b"RIFF" => Self::scan_riff(&mut file),
            b"fLaC" => Self::scan_flac(&mut file),
            _ => Err(FileError::InvalidFile(format!(
                "no metadata container in {}",
                path.display()
            ))),
        }
    }

    /// Instrument data assembled from the `smpl` and `inst` chunks, if the
    /// file carries either.
    pub fn riff_instrument(&self) -> Option<InstrumentInfo> {
        let mut info = InstrumentInfo::default();
        let mut have = false;

        if let Some(smpl) = self.smpl.as_deref() {
            if let Some(unity_note) = read_u32_le(smpl, 12) {
                info.base_note = unity_note as i32;
                have = true;
            }
            let num_loops = read_u32_le(smpl, 28).unwrap_or(0) as usize;
            for index in 0..num_loops {
                let base = SMPL_LOOPS_START + index * SMPL_LOOP_BYTES;
                let (Some(start), Some(end)) =
                    (read_u32_le(smpl, base + 8), read_u32_le(smpl, base + 12))
                else {
                    break;
                };
                info.loops.push(InstrumentLoop { start, end });
                have = true;
            }
        }

        // The inst chunk's unshifted note wins over the smpl unity note.
        if let Some(inst) = self.inst.as_deref() {
            if let Some(&note) = inst.first() {
                info.base_note = note as i32;
                have = true;
            }
        }

        have.then_some(info)
    }

    /// Wavetable descriptor from a Surge `clm ` chunk, if present.
    pub fn wavetable_info(&self) -> Option<WavetableInfo> {
        let clm = self.clm.as_deref()?;
        // Layout: "<!>" then the decimal table size, then flag text.
        let text = std::str::from_utf8(clm).ok()?;
        let rest = text.strip_prefix("<!>")?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        let table_size = digits.parse().ok()?;
        Some(WavetableInfo {
            table_size,
            one_shot: false,
        })
    }

    fn scan_riff(file: &mut BufReader<File>) -> FileResult<Self> {
        // Skip the declared RIFF size and the form type; chunks are walked
        // until EOF so payloads appended past the declared size still count.
        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;

        let mut reader = Self::default();
        loop {
            let mut chunk_header = [0u8; 8];
            match file.read_exact(&mut chunk_header) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
            let id = [
                chunk_header[0],
                chunk_header[1],
                chunk_header[2],
                chunk_header[3],
            ];
            let size = u32::from_le_bytes([
                chunk_header[4],
                chunk_header[5],
                chunk_header[6],
                chunk_header[7],
            ]) as usize;

            if reader.wants(&id) {
                let mut payload = vec![0u8; size];
                file.read_exact(&mut payload)?;
                reader.store(&id, payload);
            } else {
                file.seek(SeekFrom::Current(size as i64))?;
            }
            // Chunks are word aligned; odd sizes carry a pad byte.
            if size % 2 == 1 {
                file.seek(SeekFrom::Current(1))?;
            }
        }
        Ok(reader)
    }

    fn scan_flac(file: &mut BufReader<File>) -> FileResult<Self> {
        const BLOCK_APPLICATION: u8 = 2;

        let mut reader = Self::default();
        loop {
            let mut block_header = [0u8; 4];
            file.read_exact(&mut block_header)?;
            let last = block_header[0] & 0x80 != 0;
            let block_type = block_header[0] & 0x7f;
            let size =
                u32::from_be_bytes([0, block_header[1], block_header[2], block_header[3]]) as usize;

            if block_type == BLOCK_APPLICATION && size >= 4 {
                let mut payload = vec![0u8; size];
                file.read_exact(&mut payload)?;
                if &payload[..4] == b"riff" {
                    reader.store_foreign_riff(&payload[4..]);
                }
            } else {
                file.seek(SeekFrom::Current(size as i64))?;
            }

            if last {
                break;
            }
        }
        Ok(reader)
    }

    /// One foreign-metadata APPLICATION block holds one RIFF chunk:
    /// fourcc, little-endian size, body.
    fn store_foreign_riff(&mut self, data: &[u8]) {
        if data.len() < 8 {
            return;
        }
        let id = [data[0], data[1], data[2], data[3]];
        if &id == b"RIFF" {
            // Container header block; carries no chunk body of its own.
            return;
        }
        if !self.wants(&id) {
            return;
        }
        let size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        let body = &data[8..];
        let size = size.min(body.len());
        self.store(&id, body[..size].to_vec());
    }

    fn wants(&self, id: &[u8; 4]) -> bool {
        matches!(id, b"smpl" | b"inst" | b"clm ")
    }

    fn store(&mut self, id: &[u8; 4], payload: Vec<u8>) {
        match id {
            b"smpl" => self.smpl = Some(payload),
            b"inst" => self.inst = Some(payload),
            b"clm " => self.clm = Some(payload),
            _ => {}
        }
    }
}

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn smpl_chunk(unity_note: u32, loops: &[(u32, u32)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0u8; 12]); // manufacturer, product, period
        body.extend_from_slice(&unity_note.to_le_bytes());
        body.extend_from_slice(&[0u8; 12]); // pitch fraction, smpte
        body.extend_from_slice(&(loops.len() as u32).to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes()); // sampler data
        for &(start, end) in loops {
            body.extend_from_slice(&0u32.to_le_bytes()); // cue id
            body.extend_from_slice(&0u32.to_le_bytes()); // loop type
            body.extend_from_slice(&start.to_le_bytes());
            body.extend_from_slice(&end.to_le_bytes());
            body.extend_from_slice(&0u32.to_le_bytes()); // fraction
            body.extend_from_slice(&0u32.to_le_bytes()); // play count
        }
        body
    }

    fn riff_file(chunks: &[(&[u8; 4], Vec<u8>)]) -> NamedTempFile {
        let mut data = Vec::new();
        for (id, body) in chunks {
            data.extend_from_slice(*id);
            data.extend_from_slice(&(body.len() as u32).to_le_bytes());
            data.extend_from_slice(body);
            if body.len() % 2 == 1 {
                data.push(0);
            }
        }
        let mut file_data = Vec::new();
        file_data.extend_from_slice(b"RIFF");
        file_data.extend_from_slice(&((data.len() + 4) as u32).to_le_bytes());
        file_data.extend_from_slice(b"WAVE");
        file_data.extend_from_slice(&data);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&file_data).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_smpl_chunk_yields_loops_and_root() {
        let file = riff_file(&[(b"smpl", smpl_chunk(60, &[(100, 7000)]))]);
        let reader = MetadataReader::open(file.path()).unwrap();

        let info = reader.riff_instrument().expect("instrument data");
        assert_eq!(info.base_note, 60);
        assert_eq!(info.loops, vec![InstrumentLoop { start: 100, end: 7000 }]);
    }

    #[test]
    fn test_inst_chunk_overrides_unity_note() {
        let inst = vec![72u8, 0, 0, 0, 127, 0, 127];
        let file = riff_file(&[
            (b"smpl", smpl_chunk(60, &[])),
            (b"inst", inst),
        ]);
        let reader = MetadataReader::open(file.path()).unwrap();

        let info = reader.riff_instrument().expect("instrument data");
        assert_eq!(info.base_note, 72);
    }

    #[test]
    fn test_clm_chunk_yields_wavetable_size() {
        let file = riff_file(&[(b"clm ", b"<!>2048 10000000 wavetable".to_vec())]);
        let reader = MetadataReader::open(file.path()).unwrap();

        let wavetable = reader.wavetable_info().expect("wavetable descriptor");
        assert_eq!(wavetable.table_size, 2048);
        assert!(!wavetable.one_shot);
    }

    #[test]
    fn test_file_without_chunks_has_no_metadata() {
        let file = riff_file(&[(b"data", vec![0u8; 16])]);
        let reader = MetadataReader::open(file.path()).unwrap();
        assert!(reader.riff_instrument().is_none());
        assert!(reader.wavetable_info().is_none());
    }

    #[test]
    fn test_flac_application_block_carries_riff_chunks() {
        let smpl = smpl_chunk(48, &[(10, 20)]);
        let mut app = Vec::new();
        app.extend_from_slice(b"riff");
        app.extend_from_slice(b"smpl");
        app.extend_from_slice(&(smpl.len() as u32).to_le_bytes());
        app.extend_from_slice(&smpl);

        let mut data = Vec::new();
        data.extend_from_slice(b"fLaC");
        // STREAMINFO, not last
        data.push(0);
        data.extend_from_slice(&[0, 0, 34]);
        data.extend_from_slice(&[0u8; 34]);
        // APPLICATION, last
        data.push(0x80 | 2);
        let size = app.len() as u32;
        data.extend_from_slice(&size.to_be_bytes()[1..]);
        data.extend_from_slice(&app);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let reader = MetadataReader::open(file.path()).unwrap();
        let info = reader.riff_instrument().expect("instrument data");
        assert_eq!(info.base_note, 48);
        assert_eq!(info.loops, vec![InstrumentLoop { start: 10, end: 20 }]);
    }

    #[test]
    fn test_unknown_container_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"OggS junk").unwrap();
        file.flush().unwrap();
        assert!(MetadataReader::open(file.path()).is_err());
    }
}
