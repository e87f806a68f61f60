//! `FilterChain` collaborator (§6): stream-payload decompression.
//!
//! This sits at the boundary the core delegates to rather than owning
//! outright: the resolver only ever calls `FilterChain::decode`. The
//! concrete `StandardFilterChain` below is grounded in the teacher's
//! `Stream::decompressed_content`/`decompress_predictor` and covers the
//! filters a lenient reader actually encounters in the wild.

mod png;

use crate::object::{Dictionary, Object};
use crate::{Error, Result};
use std::cmp::max;

/// Decodes a stream payload given its declared filter chain and parameters.
/// An implementation must be pure and idempotent: calling it twice with the
/// same input yields the same output.
pub trait FilterChain {
    fn decode(&self, bytes: &[u8], filter_names: &[&[u8]], params: Option<&Dictionary>) -> Result<Vec<u8>>;
}

/// The default `FilterChain`: FlateDecode, LZWDecode, ASCII85Decode,
/// ASCIIHexDecode, each optionally followed by a PNG/TIFF predictor.
pub struct StandardFilterChain;

impl FilterChain for StandardFilterChain {
    fn decode(&self, bytes: &[u8], filter_names: &[&[u8]], params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let mut input = bytes.to_vec();
        for filter in filter_names {
            input = match *filter {
                b"FlateDecode" | b"Fl" => decompress_zlib(&input, params)?,
                b"LZWDecode" | b"LZW" => decompress_lzw(&input, params)?,
                b"ASCII85Decode" | b"A85" => decode_ascii85(&input)?,
                b"ASCIIHexDecode" | b"AHx" => decode_ascii_hex(&input)?,
                other => {
                    log::warn!("unsupported stream filter /{}", String::from_utf8_lossy(other));
                    return Err(Error::Unimplemented("decompression algorithm"));
                }
            };
        }
        Ok(input)
    }
}

fn decompress_zlib(input: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::prelude::*;

    let mut output = Vec::with_capacity(input.len() * 2);
    if !input.is_empty() {
        let mut decoder = ZlibDecoder::new(input);
        if let Err(err) = decoder.read_to_end(&mut output) {
            log::warn!("FlateDecode failed: {err}");
        }
    }
    decompress_predictor(output, params)
}

fn decompress_lzw(input: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
    use weezl::{decode::Decoder, BitOrder};
    const MIN_BITS: u8 = 9;

    let early_change = params
        .and_then(|p| p.get(b"EarlyChange").ok())
        .and_then(|p| Object::as_i64(p).ok())
        .map(|v| v != 0)
        .unwrap_or(true);

    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, MIN_BITS - 1)
    } else {
        Decoder::new(BitOrder::Msb, MIN_BITS - 1)
    };

    let mut output = vec![];
    let result = decoder.into_stream(&mut output).decode_all(input);
    if let Err(err) = result.status {
        log::warn!("LZWDecode failed: {err}");
    }
    decompress_predictor(output, params)
}

fn decode_ascii_hex(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len() / 2);
    let mut hi: Option<u8> = None;
    for &b in input {
        if b == b'>' {
            break;
        }
        let Some(nibble) = (b as char).to_digit(16) else { continue };
        let nibble = nibble as u8;
        match hi.take() {
            Some(h) => output.push((h << 4) | nibble),
            None => hi = Some(nibble),
        }
    }
    if let Some(h) = hi {
        output.push(h << 4);
    }
    Ok(output)
}

fn decode_ascii85(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = vec![];
    let mut buffer: u32 = 0;
    let mut count = 0;
    let input_no_eod = if input.len() >= 2 && &input[input.len() - 2..] == b"~>" {
        &input[..input.len() - 2]
    } else {
        log::warn!("ASCII85 stream is missing its EOD marker");
        input
    };
    for &ch in input_no_eod {
        if ch == b'z' {
            if count != 0 {
                log::warn!("'z' shortcut used mid-group in ASCII85 stream; ignoring");
                continue;
            }
            output.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        if ch.is_ascii_whitespace() {
            continue;
        }
        if !(b'!'..=b'u').contains(&ch) {
            break;
        }
        buffer = buffer.wrapping_mul(85).wrapping_add((ch - b'!') as u32);
        count += 1;
        if count == 5 {
            output.extend_from_slice(&buffer.to_be_bytes());
            buffer = 0;
            count = 0;
        }
    }
    if count > 0 {
        for _ in count..5 {
            buffer = buffer.wrapping_mul(85).wrapping_add(84);
        }
        let bytes = buffer.to_be_bytes();
        output.extend_from_slice(&bytes[..count - 1]);
    }
    Ok(output)
}

fn decompress_predictor(data: Vec<u8>, params: Option<&Dictionary>) -> Result<Vec<u8>> {
    let Some(params) = params else { return Ok(data) };
    let predictor = params.get(b"Predictor").and_then(Object::as_i64).unwrap_or(1);
    if !(10..=15).contains(&predictor) {
        return Ok(data);
    }
    let pixels_per_row = max(1, params.get(b"Columns").and_then(Object::as_i64).unwrap_or(1)) as usize;
    let colors = max(1, params.get(b"Colors").and_then(Object::as_i64).unwrap_or(1)) as usize;
    let bits = max(8, params.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8)) as usize;
    let bytes_per_pixel = max(1, colors * bits / 8);
    png::decode_frame(&data, bytes_per_pixel, pixels_per_row).map_err(Error::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii85_round_trip_known_vector() {
        let input = b"9jqo^BlbD-BleB1DJ+*+F(f,q/0JhKF<GL>Cj@.4Gp$d7F!,L7@<6@)/0JDEF<G%<+EV:2F!,O<\
DJ+*.@<*K0@<6L(Df-\\0Ec5e;DffZ(EZee.Bl.9pF\"AGXBPCsi+DGm>@3BB/F*&OCAfu2/AKYi(\
DIb:@FD,*)+C]U=@3BN#EcYf8ATD3s@q?d$AftVqCh[NqF<G:8+EV:.+Cf>-FD5W8ARlolDIal(\
DId<j@<?3r@:F%a+D58'ATD4$Bl@l3De:,-DJs`8ARoFb/0JMK@qB4^F!,R<AKZ&-DfTqBG%G>u\
D.RTpAKYo'+CT/5+Cei#DII?(E,9)oF*2M7/c~>";
        let expected = b"Man is distinguished, not only by his reason, but by this singular passion \
from other animals, which is a lust of the mind, that by a perseverance of delight in \
the continued and indefatigable generation of knowledge, exceeds the short vehemence of \
any carnal pleasure.";
        assert_eq!(decode_ascii85(input).unwrap(), expected.to_vec());
    }

    #[test]
    fn ascii_hex_decodes_odd_nibble_count() {
        assert_eq!(decode_ascii_hex(b"48656C6C6F>").unwrap(), b"Hello".to_vec());
        assert_eq!(decode_ascii_hex(b"901FA>").unwrap(), vec![0x90, 0x1F, 0xA0]);
    }

    #[test]
    fn flate_round_trips_through_chain() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello stream").unwrap();
        let compressed = encoder.finish().unwrap();

        let chain = StandardFilterChain;
        let out = chain.decode(&compressed, &[b"FlateDecode"], None).unwrap();
        assert_eq!(out, b"hello stream".to_vec());
    }
}
