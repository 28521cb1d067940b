// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! RGBA raster images carried as node properties.
//!
//! On the wire an image is a Netpbm PAM (`P7`, `RGB_ALPHA`) container. Two encodings of the
//! same picture may differ in header whitespace, so equality is always decided on pixels.

use std::fmt;

const BYTES_PER_PIXEL: usize = 4;

#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, ImageError> {
        let expected = pixel_len(width, height)?;
        if rgba.len() != expected {
            return Err(ImageError::PixelLength {
                expected,
                found: rgba.len(),
            });
        }
        Ok(Self { width, height, rgba })
    }

    /// A single-colour image.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, ImageError> {
        let len = pixel_len(width, height)?;
        let pixels = rgba.iter().copied().cycle().take(len).collect();
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn encode_pam(&self) -> Vec<u8> {
        let header = format!(
            "P7\nWIDTH {}\nHEIGHT {}\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n",
            self.width, self.height
        );
        let mut out = Vec::with_capacity(header.len() + self.rgba.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.rgba);
        out
    }

    pub fn decode_pam(bytes: &[u8]) -> Result<Self, ImageError> {
        const END: &[u8] = b"ENDHDR\n";
        let header_end = bytes
            .windows(END.len())
            .position(|window| window == END)
            .ok_or(ImageError::Header("missing ENDHDR"))?;
        let header = std::str::from_utf8(&bytes[..header_end])
            .map_err(|_| ImageError::Header("header is not utf-8"))?;

        let mut lines = header.lines().map(str::trim).filter(|l| !l.is_empty());
        if lines.next() != Some("P7") {
            return Err(ImageError::Header("missing P7 magic"));
        }

        let mut width = None;
        let mut height = None;
        for line in lines {
            let (key, value) = line.split_once(' ').unwrap_or((line, ""));
            let value = value.trim();
            match key {
                "WIDTH" => width = value.parse::<u32>().ok(),
                "HEIGHT" => height = value.parse::<u32>().ok(),
                "DEPTH" if value != "4" => return Err(ImageError::Header("DEPTH must be 4")),
                "MAXVAL" if value != "255" => {
                    return Err(ImageError::Header("MAXVAL must be 255"))
                }
                "TUPLTYPE" if value != "RGB_ALPHA" => {
                    return Err(ImageError::Header("TUPLTYPE must be RGB_ALPHA"))
                }
                _ => {}
            }
        }

        let width = width.ok_or(ImageError::Header("missing WIDTH"))?;
        let height = height.ok_or(ImageError::Header("missing HEIGHT"))?;
        let pixels = bytes[header_end + END.len()..].to_vec();
        Self::new(width, height, pixels)
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

fn pixel_len(width: u32, height: u32) -> Result<usize, ImageError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or(ImageError::TooLarge { width, height })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    Header(&'static str),
    PixelLength { expected: usize, found: usize },
    TooLarge { width: u32, height: u32 },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(reason) => write!(f, "invalid PAM header: {reason}"),
            Self::PixelLength { expected, found } => {
                write!(f, "pixel data has {found} bytes, expected {expected}")
            }
            Self::TooLarge { width, height } => write!(f, "image {width}x{height} is too large"),
        }
    }
}

impl std::error::Error for ImageError {}
