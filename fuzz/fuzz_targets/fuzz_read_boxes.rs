#![no_main]
use libfuzzer_sys::fuzz_target;
use unci_boxes::{read_boxes_with_options, ParseOptions, UncompressedBox};

fuzz_target!(|data: &[u8]| {
    let Ok(boxes) = read_boxes_with_options(&mut &data[..], &ParseOptions::lenient()) else {
        return;
    };
    for b in boxes.iter() {
        let _ = b.to_string();
        // Whatever parses must write, and read back unchanged
        let Ok(bytes) = b.to_vec() else { continue };
        let reread = read_boxes_with_options(&mut &bytes[..], &ParseOptions::lenient()).unwrap();
        let reread: Vec<&UncompressedBox> = reread.iter().collect();
        assert_eq!(reread, [b]);
    }
});
