use std::cell::RefCell;
use std::rc::Rc;

use archiver::events::{DecodeEventSink, UnarchiveErrorEvent, UnarchiveExtractEvent, UnarchiveFinishEvent};
use archiver::zip::UnzipDecoder;
use tracing::{debug, subscriber::set_global_default, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::TRACE).with_file(false).with_line_number(true).finish();

    #[allow(clippy::expect_used)]
    set_global_default(subscriber).expect("setting default subscriber failed");

    let path = std::env::args().nth(1).unwrap_or_else(|| "./resources/zip/sample.zip".to_string());
    let bytes = std::fs::read(&path)?;

    let file_count = Rc::new(RefCell::new(0u64));
    let file_count_clone = file_count.clone();

    let events = DecodeEventSink::new()
        .on_extract(move |event: &UnarchiveExtractEvent| {
            debug!("{}", event.file.filename);
            debug!("   bytes: {}", event.file.file_data.len());
            *file_count_clone.borrow_mut() += 1;
        })
        .on_finish(move |event: &UnarchiveFinishEvent| {
            debug!("archive comment: {:?}", event.metadata.comment);
        })
        .on_error(|event: &UnarchiveErrorEvent| debug!("error: {}", event.message));

    let mut decoder = UnzipDecoder::new(events);
    decoder.push(bytes);

    debug!("extracted {} files", file_count.borrow());

    Ok(())
}
