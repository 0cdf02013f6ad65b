use archiver::events::{DecodeEventSink, UnarchiveErrorEvent, UnarchiveExtractEvent};
use archiver::tar::UntarDecoder;
use tracing::{debug, subscriber::set_global_default, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::TRACE).with_file(false).with_line_number(true).finish();

    #[allow(clippy::expect_used)]
    set_global_default(subscriber).expect("setting default subscriber failed");

    let path = std::env::args().nth(1).unwrap_or_else(|| "./resources/tar/sample.tar".to_string());
    let bytes = std::fs::read(&path)?;

    let events = DecodeEventSink::new()
        .on_extract(|event: &UnarchiveExtractEvent| {
            debug!("{}", event.file.filename);
            debug!("   bytes: {}", event.file.file_data.len());
            if let Some(info) = &event.file.info {
                debug!("   typeflag: {info}");
            }
        })
        .on_error(|event: &UnarchiveErrorEvent| debug!("error: {}", event.message));

    let mut decoder = UntarDecoder::new(events);
    decoder.push(bytes);

    Ok(())
}
