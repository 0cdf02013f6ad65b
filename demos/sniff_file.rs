use archiver::sniffer;
use tracing::{debug, subscriber::set_global_default, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::TRACE).with_file(false).with_line_number(true).finish();

    #[allow(clippy::expect_used)]
    set_global_default(subscriber).expect("setting default subscriber failed");

    let path = std::env::args().nth(1).unwrap_or_else(|| "./resources/zip/sample.zip".to_string());
    let bytes = std::fs::read(&path)?;

    match sniffer::sniff(&bytes) {
        Some(mime) => debug!("{path}: {mime}"),
        None => debug!("{path}: unrecognized format"),
    }

    Ok(())
}
