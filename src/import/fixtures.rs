//! Synthetic image files for import tests.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

type Dms = [(u32, u32); 3];

/// EXIF fields written into a test JPEG.
pub struct Exif<'a> {
    /// `YYYY:MM:DD HH:MM:SS`, exactly 19 characters.
    pub datetime: &'a str,
    pub orientation: u16,
    pub latitude: Option<(Dms, u8)>,
    pub longitude: Option<(Dms, u8)>,
}

/// A small gradient so encoders produce non-trivial output.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    }))
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    gradient(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    gradient(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .unwrap();
    bytes
}

fn ifd_entry(buf: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
    buf.extend_from_slice(&tag.to_be_bytes());
    buf.extend_from_slice(&kind.to_be_bytes());
    buf.extend_from_slice(&count.to_be_bytes());
    buf.extend_from_slice(&value);
}

const SHORT: u16 = 3;
const ASCII: u16 = 2;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

/// Big-endian TIFF block holding IFD0, the Exif IFD and the GPS IFD.
fn tiff(exif: &Exif<'_>) -> Vec<u8> {
    assert_eq!(exif.datetime.len(), 19);
    let gps = exif.latitude.zip(exif.longitude);

    let ifd0: u32 = 8;
    let exif_ifd = ifd0 + 2 + 3 * 12 + 4;
    let gps_ifd = exif_ifd + 2 + 12 + 4;
    let datetime_offset = gps_ifd + 2 + 4 * 12 + 4;
    let lat_offset = datetime_offset + 20;
    let lon_offset = lat_offset + 24;

    let mut buf = b"MM\x00\x2a".to_vec();
    buf.extend_from_slice(&ifd0.to_be_bytes());

    buf.extend_from_slice(&3u16.to_be_bytes());
    let [hi, lo] = exif.orientation.to_be_bytes();
    ifd_entry(&mut buf, 0x0112, SHORT, 1, [hi, lo, 0, 0]);
    ifd_entry(&mut buf, 0x8769, LONG, 1, exif_ifd.to_be_bytes());
    ifd_entry(&mut buf, 0x8825, LONG, 1, gps_ifd.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());

    buf.extend_from_slice(&1u16.to_be_bytes());
    ifd_entry(&mut buf, 0x9003, ASCII, 20, datetime_offset.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());

    // Without coordinates the GPS IFD still exists, holding only the
    // reference tags, so offsets stay fixed.
    let (lat_ref, lon_ref) = gps.map_or((b'N', b'E'), |((_, a), (_, b))| (a, b));
    buf.extend_from_slice(&(if gps.is_some() { 4u16 } else { 2u16 }).to_be_bytes());
    ifd_entry(&mut buf, 0x0001, ASCII, 2, [lat_ref, 0, 0, 0]);
    if gps.is_some() {
        ifd_entry(&mut buf, 0x0002, RATIONAL, 3, lat_offset.to_be_bytes());
    }
    ifd_entry(&mut buf, 0x0003, ASCII, 2, [lon_ref, 0, 0, 0]);
    if gps.is_some() {
        ifd_entry(&mut buf, 0x0004, RATIONAL, 3, lon_offset.to_be_bytes());
    } else {
        // Pad the two missing entries.
        buf.extend_from_slice(&[0u8; 24]);
    }
    buf.extend_from_slice(&0u32.to_be_bytes());

    assert_eq!(buf.len() as u32, datetime_offset);
    buf.extend_from_slice(exif.datetime.as_bytes());
    buf.push(0);

    let ((lat, _), (lon, _)) = gps.unwrap_or((([(0, 1); 3], b'N'), ([(0, 1); 3], b'E')));
    for (num, den) in lat.iter().chain(lon.iter()) {
        buf.extend_from_slice(&num.to_be_bytes());
        buf.extend_from_slice(&den.to_be_bytes());
    }
    assert_eq!(buf.len() as u32, lon_offset + 24);
    buf
}

/// A JPEG of the given size carrying an APP1 EXIF segment.
pub fn jpeg_with_exif(width: u32, height: u32, exif: &Exif<'_>) -> Vec<u8> {
    let jpeg = jpeg(width, height);
    let tiff = tiff(exif);

    let segment_len = (2 + 6 + tiff.len()) as u16;
    let mut bytes = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    bytes.extend_from_slice(&jpeg[..2]);
    bytes.extend_from_slice(&[0xFF, 0xE1]);
    bytes.extend_from_slice(&segment_len.to_be_bytes());
    bytes.extend_from_slice(b"Exif\x00\x00");
    bytes.extend_from_slice(&tiff);
    bytes.extend_from_slice(&jpeg[2..]);
    bytes
}
