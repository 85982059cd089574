use pagecast_lib::PagecastError;

#[test]
fn error_messages_carry_their_cause() {
    let cases = [
        (
            PagecastError::Launch("no chromium on PATH".into()),
            "Browser launch failed: no chromium on PATH",
        ),
        (
            PagecastError::Negotiation("no capture offer within 15s".into()),
            "Capture negotiation failed: no capture offer within 15s",
        ),
        (
            PagecastError::Navigation("net::ERR_CONNECTION_REFUSED".into()),
            "Navigation failed: net::ERR_CONNECTION_REFUSED",
        ),
        (
            PagecastError::UnknownDestination("hbo".into()),
            "Unknown destination: hbo",
        ),
        (
            PagecastError::Cdp("target crashed".into()),
            "Browser protocol error: target crashed",
        ),
        (
            PagecastError::Config("bad viewport".into()),
            "Configuration error: bad viewport",
        ),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn io_errors_convert_with_context() {
    let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port 5589 busy");
    let err: PagecastError = io.into();
    assert!(err.to_string().contains("port 5589 busy"));
}

#[test]
fn pre_stream_classification_drives_http_error_surface() {
    // Only navigation failures happen after bytes may be flowing; every
    // other failure still has an HTTP error channel.
    assert!(PagecastError::Launch("x".into()).is_pre_stream());
    assert!(PagecastError::Negotiation("x".into()).is_pre_stream());
    assert!(PagecastError::UnknownDestination("x".into()).is_pre_stream());
    assert!(!PagecastError::Navigation("x".into()).is_pre_stream());
}
