/// Fragment decoders: turn one CB page's hex into plaintext.
///
/// [`CbsDecoder`] does the work in-process and is the default. [`ScriptDecoder`]
/// hands the fragment to an external program, giving every call its own
/// scratch directory so concurrent or interleaved calls never share files.
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use crate::defaults::DECODE_TIMEOUT_MS;
use crate::error::DetectError;
use crate::exec::run_bounded;

/// Converts one hex fragment into plaintext.
pub trait DecodeBridge: Send + Sync {
    fn decode(&self, fragment_hex: &str) -> Result<String, DetectError>;
}

/// Character coding of the CB data, as signalled by the data coding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coding {
    /// GSM 03.38 default alphabet, 7-bit packed.
    #[default]
    Gsm7,
    /// UCS-2, big endian.
    Ucs2,
    /// Raw bytes interpreted as UTF-8.
    Utf8,
}

/// In-process CB data decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct CbsDecoder {
    pub coding: Coding,
}

impl CbsDecoder {
    pub const fn new(coding: Coding) -> Self {
        Self { coding }
    }
}

impl DecodeBridge for CbsDecoder {
    fn decode(&self, fragment_hex: &str) -> Result<String, DetectError> {
        let bytes = hex_to_bytes(fragment_hex)
            .ok_or_else(|| DetectError::DecodeUnavailable("fragment is not hex".into()))?;

        let text = match self.coding {
            Coding::Gsm7 => unpack_gsm7(&bytes),
            Coding::Ucs2 => decode_ucs2(&bytes),
            Coding::Utf8 => String::from_utf8_lossy(&bytes).into_owned(),
        };

        // Unused tail of a CB page is padded with CR. An empty page is valid.
        Ok(text.trim_end_matches('\r').to_string())
    }
}

/// Decode a hex string. Returns `None` on odd length or non-hex characters.
pub fn hex_to_bytes(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.as_bytes();
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.chunks(2)
        .map(|pair| {
            let s = core::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}

/// GSM 03.38 default alphabet.
static GSM7_BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1b}', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

const GSM7_ESCAPE: u8 = 0x1B;

/// Extension table reached through the escape septet.
fn gsm7_extension(septet: u8) -> Option<char> {
    match septet {
        0x0A => Some('\u{0c}'),
        0x14 => Some('^'),
        0x28 => Some('{'),
        0x29 => Some('}'),
        0x2F => Some('\\'),
        0x3C => Some('['),
        0x3D => Some('~'),
        0x3E => Some(']'),
        0x40 => Some('|'),
        0x65 => Some('€'),
        _ => None,
    }
}

/// Unpack 7-bit septets from `packed` octets and map them through the
/// default alphabet.
pub fn unpack_gsm7(packed: &[u8]) -> String {
    let septets = packed.len() * 8 / 7;
    let mut out = String::with_capacity(septets);
    let mut escaped = false;

    for i in 0..septets {
        let bit = i * 7;
        let (byte, shift) = (bit / 8, bit % 8);
        let lo = packed[byte] as u16 >> shift;
        let hi = packed.get(byte + 1).map_or(0, |&b| (b as u16) << (8 - shift));
        let septet = ((lo | hi) & 0x7F) as u8;

        if escaped {
            escaped = false;
            out.push(gsm7_extension(septet).unwrap_or(' '));
        } else if septet == GSM7_ESCAPE {
            escaped = true;
        } else {
            out.push(GSM7_BASIC[septet as usize]);
        }
    }
    out
}

fn decode_ucs2(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Decoder that runs an external program once per fragment.
///
/// The program is invoked as `program [args...] <input> <output>`: it reads the hex
/// fragment from `<input>` and must write plaintext to `<output>`. Both
/// paths live in a fresh temporary directory that is removed after the call.
#[derive(Debug, Clone)]
pub struct ScriptDecoder {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ScriptDecoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_millis(DECODE_TIMEOUT_MS),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl DecodeBridge for ScriptDecoder {
    fn decode(&self, fragment_hex: &str) -> Result<String, DetectError> {
        let unavailable = |what: &str, e: &dyn core::fmt::Display| {
            DetectError::DecodeUnavailable(format!("{}: {}", what, e))
        };

        let scratch = tempfile::tempdir().map_err(|e| unavailable("scratch dir", &e))?;
        let input = scratch.path().join("fragment.hex");
        let output = scratch.path().join("text");
        fs::write(&input, fragment_hex).map_err(|e| unavailable("write fragment", &e))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(&input).arg(&output);
        run_bounded(&mut cmd, self.timeout)
            .map_err(|e| unavailable(&self.program.display().to_string(), &e))?;

        let text = fs::read_to_string(&output).map_err(|e| unavailable("read text", &e))?;
        if text.is_empty() {
            return Err(DetectError::DecodeUnavailable("decoder produced no text".into()));
        }
        Ok(text)
    }
}
