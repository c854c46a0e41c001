#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate mailsoup;

use mailsoup::*;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = read_message(data) {
        let _ = msg.rfc822(false);
        let _ = msg.rfc822(true);
        if let Some(header) = msg.header() {
            let _ = header.valid();
            let _ = parse_date(header.get("Date"));
        }
    }
});
