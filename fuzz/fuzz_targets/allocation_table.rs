#![no_main]

use cacheshare::allocation::{AllocationResolver, AllocationTable};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(table) = AllocationTable::from_reader(data) {
        for alloc in table.iter() {
            if alloc.size > 0 {
                let hit = table.resolve(alloc.start);
                assert_eq!(hit.map(|h| h.malloc_id), Some(alloc.id));
            }
        }
    }
});
