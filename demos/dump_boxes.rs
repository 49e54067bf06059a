//! Dump the cmpd, uncC, cmpC and icef boxes found at the top level of a file
use std::env;
use std::fs::File;
use std::io::BufReader;

use unci_boxes::ParseOptions;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <file> [--lenient]", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let options = if args.iter().any(|a| a == "--lenient") {
        ParseOptions::lenient()
    } else {
        ParseOptions::default()
    };

    let f = File::open(path).expect("Failed to open file");
    let boxes = unci_boxes::read_boxes_with_options(&mut BufReader::new(f), &options).expect("Failed to read boxes");

    println!("Boxes in {path}:");
    for b in boxes.iter() {
        print!("{b}");
    }
}
