#![no_main]
use libfuzzer_sys::fuzz_target;
use memtrace::io::TraceStore;
use memtrace::trace::{parse_allocations, scan_memory_ops};
use memtrace::tracer::{trace_range, AddressInterval};

fuzz_target!(|data: &[u8]| {
    let store = TraceStore::from_text(String::from_utf8_lossy(data).into_owned());
    if let Ok(records) = parse_allocations(&store) {
        for record in records.iter().take(4) {
            let _ = trace_range(&store, record.origin_line, AddressInterval::of_allocation(record));
        }
    }
    for op in scan_memory_ops(&store, 0) {
        if op.is_err() {
            break;
        }
    }
    let _ = AddressInterval::new(0, u64::MAX).map(|iv| trace_range(&store, 0, iv));
});
