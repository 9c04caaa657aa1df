use log::error;

/// Log the full context chain of `err` once and hand it back to the caller.
pub fn handle_error(err: anyhow::Error) -> anyhow::Error {
    let mut message = format!("{}", err);
    for cause in err.chain().skip(1) {
        message.push_str(&format!("\n  caused by: {}", cause));
    }
    error!("{}", message);
    err
}

/// Render an error and its causes on a single line for outcome reports.
pub fn flatten_error(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
