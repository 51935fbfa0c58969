#![no_main]

use gallerydb::Rgb;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    // Any accepted color must round-trip through its hex form
    if let Ok(color) = Rgb::parse(input) {
        assert_eq!(Rgb::parse(&color.to_hex()).ok(), Some(color));
        let lab = color.to_lab();
        assert!(lab.l.is_finite() && lab.a.is_finite() && lab.b.is_finite());
    }
});
