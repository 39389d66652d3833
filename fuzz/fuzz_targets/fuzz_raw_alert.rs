#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;

use domain::alert::entity::{Alert, AlertRecord, RawAlert};
use domain::alert::feed::AlertFeed;

// Fuzz record validation and feed merging with arbitrary JSON rows.
//
// Layout:
//   [0]  = feed capacity (1-32)
//   rest = JSON array of loosely-typed alert rows
//
// Every row that validates is enriched and merged twice; the second merge
// must be a no-op and the feed must stay within capacity.
fuzz_target!(|data: &[u8]| {
    let Some((&cap, rest)) = data.split_first() else {
        return;
    };
    let Ok(rows) = serde_json::from_slice::<Vec<RawAlert>>(rest) else {
        return;
    };

    let mut feed = AlertFeed::new(usize::from(cap % 32) + 1);
    let now = Utc::now();

    for raw in rows {
        let _ = raw.defaulted_fields();
        let Ok(record) = AlertRecord::from_raw(raw, now) else {
            continue;
        };
        let alert = Alert::enrich(record);

        assert!(feed.merge(alert.clone()).is_ok());
        assert!(!feed.merge(alert).is_ok_and(|outcome| outcome.changed()));
        assert!(feed.len() <= feed.capacity());
    }

    let alerts = feed.alerts();
    assert!(alerts.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
});
