//! Box framing tests, and the fixture builders shared by the box modules.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::{
    read_box, read_box_header, read_boxes, read_boxes_with_options, BoxIter, BoxType, Error, ParseOptions,
    UncompressedBox,
};
use std::io::Cursor;
use test_assembler::*;

pub(crate) enum BoxSize {
    Short(u32),
    Long(u64),
    UncheckedShort(u32),
    UncheckedLong(u64),
    Auto,
}

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn make_box<F>(size: BoxSize, name: &[u8; 4], func: F) -> std::vec::Vec<u8>
where
    F: Fn(Section) -> Section,
{
    let mut section = Section::new();
    let box_size = Label::new();
    section = match size {
        BoxSize::Short(size) | BoxSize::UncheckedShort(size) => section.B32(size),
        BoxSize::Long(_) | BoxSize::UncheckedLong(_) => section.B32(1),
        BoxSize::Auto => section.B32(&box_size),
    };
    section = section.append_bytes(name);
    section = match size {
        BoxSize::Long(size) | BoxSize::UncheckedLong(size) => section.B64(size),
        _ => section,
    };
    section = func(section);
    match size {
        BoxSize::Short(size) => {
            if size > 0 {
                assert_eq!(u64::from(size), section.size());
            }
        },
        BoxSize::Long(size) => assert_eq!(size, section.size()),
        BoxSize::Auto => {
            assert!(section.size() <= u64::from(u32::MAX), "Tried to use a long box with BoxSize::Auto");
            box_size.set_const(section.size());
        },
        BoxSize::UncheckedShort(_) | BoxSize::UncheckedLong(_) => {},
    }
    section.get_contents().unwrap()
}

pub(crate) fn make_fullbox<F>(size: BoxSize, name: &[u8; 4], version: u8, func: F) -> std::vec::Vec<u8>
where
    F: Fn(Section) -> Section,
{
    make_box(size, name, |s| func(s.B8(version).B8(0).B8(0).B8(0)))
}

#[test]
fn read_box_header_short() {
    let data = make_box(BoxSize::Short(8), b"test", |s| s);
    let header = read_box_header(&mut data.as_slice()).unwrap();
    assert_eq!(header.name, BoxType::UnknownBox(0x7465_7374));
    assert_eq!(header.size, 8);
    assert_eq!(header.offset, 8);
}

#[test]
fn read_box_header_long() {
    let data = make_box(BoxSize::Long(16), b"cmpd", |s| s);
    let header = read_box_header(&mut data.as_slice()).unwrap();
    assert_eq!(header.name, BoxType::ComponentDefinitionBox);
    assert_eq!(header.size, 16);
    assert_eq!(header.offset, 16);
}

#[test]
fn read_box_header_short_size_invalid() {
    let data = make_box(BoxSize::UncheckedShort(4), b"cmpd", |s| s);
    assert!(matches!(read_box_header(&mut data.as_slice()), Err(Error::InvalidData(_))));
}

#[test]
fn read_box_header_long_size_invalid() {
    let data = Section::new().B32(1).append_bytes(b"icef").B64(8).get_contents().unwrap();
    assert!(matches!(read_box_header(&mut data.as_slice()), Err(Error::InvalidData(_))));
}

#[test]
fn box_iter_stops_at_end() {
    let data = make_box(BoxSize::Auto, b"free", |s| s.append_repeated(0, 4));
    let mut src = data.as_slice();
    let mut iter = BoxIter::new(&mut src);
    {
        let mut b = iter.next_box().unwrap().unwrap();
        assert_eq!(b.bytes_left(), 4);
        super::skip_box_content(&mut b).unwrap();
    }
    assert!(iter.next_box().unwrap().is_none());
}

#[test]
fn unknown_boxes_are_skipped() {
    init_logger();
    let mut data = make_box(BoxSize::Auto, b"free", |s| s.append_repeated(0xaa, 10));
    data.extend(make_fullbox(BoxSize::Auto, b"cmpC", 0, |s| s.append_bytes(b"zlib").B8(3)));
    data.extend(make_box(BoxSize::Auto, b"skip", |s| s.B32(7)));

    let boxes = read_boxes(&mut Cursor::new(data)).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].box_type(), BoxType::GenericCompressionConfigBox);
}

#[test]
fn read_box_returns_none_when_empty() {
    let mut src: &[u8] = &[];
    assert!(read_box(&mut src, &ParseOptions::default()).unwrap().is_none());
}

#[test]
fn trailing_padding_is_tolerated() {
    init_logger();
    let mut data = make_fullbox(BoxSize::Auto, b"cmpC", 0, |s| s.append_bytes(b"defl").B8(0).append_repeated(0, 3));
    data.extend(make_fullbox(BoxSize::Auto, b"cmpC", 0, |s| s.append_bytes(b"brot").B8(1)));

    let boxes = read_boxes(&mut Cursor::new(data)).unwrap();
    assert_eq!(boxes.len(), 2);
    match &boxes[1] {
        UncompressedBox::GenericCompressionConfig(cmpc) => assert_eq!(cmpc.compression_type(), crate::FourCC::BROTLI),
        other => panic!("unexpected box {other:?}"),
    }
}

#[test]
fn malformed_box_aborts_reading() {
    let mut data = make_fullbox(BoxSize::Auto, b"cmpC", 0, |s| s.append_bytes(b"defl").B8(0));
    // Offset code 7 has no field width
    data.extend(make_fullbox(BoxSize::Auto, b"icef", 0, |s| s.B32(1).B8(0b111_000_00)));
    assert!(matches!(read_boxes(&mut Cursor::new(data)), Err(Error::InvalidData(_))));
}

#[test]
fn nonzero_flags_need_lenient_mode() {
    let data = make_box(BoxSize::Auto, b"cmpC", |s| s.B8(0).B8(0).B8(0).B8(1).append_bytes(b"defl").B8(0));

    let strict = read_boxes(&mut Cursor::new(data.clone()));
    assert!(matches!(strict, Err(Error::Unsupported(_))));

    let lenient = read_boxes_with_options(&mut Cursor::new(data.clone()), &ParseOptions::lenient()).unwrap();
    assert_eq!(lenient.len(), 1);
    assert_eq!(lenient[0].to_vec().unwrap(), data);
}

#[test]
fn unsupported_version() {
    let data = make_fullbox(BoxSize::Auto, b"icef", 1, |s| s.B32(0));
    assert!(matches!(read_boxes(&mut Cursor::new(data)), Err(Error::Unsupported(_))));
}

#[test]
fn largesize_box_is_parsed() {
    let data = make_box(BoxSize::Long(16 + 4 + 5), b"cmpC", |s| s.B32(0).append_bytes(b"zlib").B8(2));
    let boxes = read_boxes(&mut Cursor::new(data)).unwrap();
    assert_eq!(boxes.len(), 1);
}

#[test]
fn size_zero_box_extends_to_end() {
    let data = make_box(BoxSize::UncheckedShort(0), b"cmpC", |s| s.B32(0).append_bytes(b"zlib").B8(2));
    let boxes = read_boxes(&mut Cursor::new(data)).unwrap();
    assert_eq!(boxes.len(), 1);
    // Written back with an explicit size
    assert_eq!(boxes[0].to_vec().unwrap()[..4], [0, 0, 0, 17]);
}

#[test]
fn boxes_are_send_and_sync() {
    fn check<T: Send + Sync>() {}
    check::<UncompressedBox>();
    check::<crate::BoxWriter<std::vec::Vec<u8>>>();
}
