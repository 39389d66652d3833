#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::alert::geo::{FALLBACK_POSITION, project};

// Fuzz the display-coordinate projector with arbitrary address text.
//
// The projector is total: any input yields a finite coordinate inside the
// display bounds, and the same input always yields the same bits.
fuzz_target!(|data: &[u8]| {
    let address = String::from_utf8_lossy(data);

    let first = project(&address);
    let second = project(&address);
    assert_eq!(first.lat.to_bits(), second.lat.to_bits());
    assert_eq!(first.lng.to_bits(), second.lng.to_bits());

    assert!(first.lat.is_finite() && first.lng.is_finite());
    assert!((-80.0..80.0).contains(&first.lat));
    assert!((-180.0..180.0).contains(&first.lng));

    if address.split('.').count() != 4 {
        assert_eq!(first, FALLBACK_POSITION);
    }
});
