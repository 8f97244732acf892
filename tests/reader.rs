use rawio::{CancelReason, CancellationToken, Error, ExtractFd, RawReader, extract_fd};

use std::io::Write;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::os::unix::thread::JoinHandleExt;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const BOUND: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(100);

fn init() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    assert_eq!(rc, 0, "pipe2 failed");

    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

fn write(fd: &OwnedFd, data: &[u8]) {
    let n = unsafe { libc::write(fd.as_raw_fd(), data.as_ptr() as *const _, data.len()) };
    assert_eq!(n, data.len() as isize, "short write");
}

/// Starts a read on another thread and returns where its result lands.
fn spawn_read(
    reader: &Arc<RawReader>,
    token: Option<CancellationToken>,
) -> (mpsc::Receiver<(usize, Option<Error>)>, thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let reader = Arc::clone(reader);

    let handle = thread::spawn(move || {
        let mut buffer = [0u8; 10];
        let result = match &token {
            Some(token) => reader.read_with_cancellation(token, &mut buffer),
            None => reader.read(&mut buffer),
        };

        let _ = match result {
            Ok(n) => tx.send((n, None)),
            Err(err) => tx.send((0, Some(err))),
        };
    });

    (rx, handle)
}

#[test]
fn normal_transfer() {
    init();
    let (rx, tx) = pipe();
    let reader = RawReader::new(rx).unwrap();

    write(&tx, b"hello");

    let mut buffer = [0u8; 10];
    let n = reader.read(&mut buffer).unwrap();
    assert_eq!(n, 5);
    assert_eq!(&buffer[..n], b"hello");
}

#[test]
fn hangup_without_data_is_end_of_stream() {
    init();
    let (rx, tx) = pipe();
    let reader = RawReader::new(rx).unwrap();

    drop(tx);

    let mut buffer = [0u8; 10];
    assert!(matches!(reader.read(&mut buffer), Err(Error::EndOfStream)));
}

#[test]
fn hangup_while_blocked_is_end_of_stream() {
    init();
    let (rx, tx) = pipe();
    let reader = Arc::new(RawReader::new(rx).unwrap());

    let (result, handle) = spawn_read(&reader, None);
    thread::sleep(SETTLE);
    drop(tx);

    let (n, err) = result.recv_timeout(BOUND).expect("read did not return");
    assert_eq!(n, 0);
    assert!(matches!(err, Some(Error::EndOfStream)));
    handle.join().unwrap();
}

#[test]
fn blocked_read_receives_late_data() {
    init();
    let (rx, tx) = pipe();
    let reader = Arc::new(RawReader::new(rx).unwrap());

    let (result, handle) = spawn_read(&reader, None);
    thread::sleep(SETTLE);
    write(&tx, b"late");

    let (n, err) = result.recv_timeout(BOUND).expect("read did not return");
    assert_eq!(n, 4);
    assert!(err.is_none());
    handle.join().unwrap();
}

#[test]
fn close_unblocks_read() {
    init();
    let (rx, _tx) = pipe();
    let reader = Arc::new(RawReader::new(rx).unwrap());

    let (result, handle) = spawn_read(&reader, None);
    thread::sleep(SETTLE);

    reader.close().unwrap();

    let (n, err) = result.recv_timeout(BOUND).expect("read did not return");
    assert_eq!(n, 0);
    assert!(matches!(err, Some(Error::EndOfStream)));
    handle.join().unwrap();

    reader.close().unwrap();
    assert_eq!(reader.fd(), -1);
}

#[test]
fn cancellation_unblocks_read() {
    init();
    let (rx, _tx) = pipe();
    let reader = Arc::new(RawReader::new(rx).unwrap());
    let token = CancellationToken::new();

    let (result, handle) = spawn_read(&reader, Some(token.clone()));
    thread::sleep(SETTLE);

    assert!(token.cancel());

    let (n, err) = result.recv_timeout(BOUND).expect("read did not return");
    assert_eq!(n, 0);
    assert!(matches!(
        err,
        Some(Error::Cancelled(CancelReason::Cancelled))
    ));
    handle.join().unwrap();

    // The reader stays usable after a cancelled read.
    assert!(!reader.is_closed());
}

#[test]
fn deadline_unblocks_read() {
    init();
    let (rx, _tx) = pipe();
    let reader = RawReader::new(rx).unwrap();
    let token = CancellationToken::with_timeout(Duration::from_millis(50));

    let start = Instant::now();
    let mut buffer = [0u8; 10];
    let err = reader
        .read_with_cancellation(&token, &mut buffer)
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Cancelled(CancelReason::DeadlineExceeded)
    ));
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(start.elapsed() < BOUND);
}

#[test]
fn already_cancelled_token_does_not_block() {
    init();
    let (rx, _tx) = pipe();
    let reader = RawReader::new(rx).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let mut buffer = [0u8; 10];
    let err = reader
        .read_with_cancellation(&token, &mut buffer)
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn available_data_wins_over_cancelled_token() {
    init();
    let (rx, tx) = pipe();
    let reader = RawReader::new(rx).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    write(&tx, b"data");

    let mut buffer = [0u8; 10];
    assert_eq!(reader.read_with_cancellation(&token, &mut buffer).unwrap(), 4);
}

extern "C" fn ignore(_: libc::c_int) {}

#[test]
fn unrelated_signal_does_not_end_read() {
    init();
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = ignore as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        assert_eq!(libc::sigaction(libc::SIGUSR2, &action, std::ptr::null_mut()), 0);
    }

    let (rx, tx) = pipe();
    let reader = Arc::new(RawReader::new(rx).unwrap());

    let (result, handle) = spawn_read(&reader, None);
    thread::sleep(SETTLE);

    unsafe { libc::pthread_kill(handle.as_pthread_t(), libc::SIGUSR2) };
    thread::sleep(SETTLE);
    assert!(result.try_recv().is_err(), "read returned early");

    write(&tx, b"after");

    let (n, err) = result.recv_timeout(BOUND).expect("read did not return");
    assert_eq!(n, 5);
    assert!(err.is_none());
    handle.join().unwrap();
}

#[test]
fn reader_from_extracted_socket() {
    init();
    let (ours, mut theirs) = UnixStream::pair().unwrap();
    let reader = RawReader::extract_from(ours).unwrap();

    theirs.write_all(b"ping").unwrap();

    let mut buffer = [0u8; 10];
    assert_eq!(reader.read(&mut buffer).unwrap(), 4);
    assert_eq!(&buffer[..4], b"ping");

    drop(theirs);
    assert!(reader.read(&mut buffer).unwrap_err().is_end_of_stream());
}

#[test]
fn data_before_peer_shutdown_is_returned_first() {
    init();
    let (ours, mut theirs) = UnixStream::pair().unwrap();
    let reader = Arc::new(RawReader::extract_from(ours).unwrap());

    let (result, handle) = spawn_read(&reader, None);
    thread::sleep(SETTLE);

    theirs.write_all(b"bye").unwrap();
    theirs.shutdown(Shutdown::Write).unwrap();

    let (n, err) = result.recv_timeout(BOUND).expect("read did not return");
    assert_eq!(n, 3);
    assert!(err.is_none());
    handle.join().unwrap();

    let mut buffer = [0u8; 10];
    assert!(matches!(reader.read(&mut buffer), Err(Error::EndOfStream)));
}

struct NoHandle;

impl ExtractFd for NoHandle {}

#[test]
fn extraction_without_descriptor_fails() {
    init();
    assert!(matches!(extract_fd(NoHandle), Err(Error::NoDescriptor)));
    assert!(matches!(
        RawReader::extract_from(NoHandle),
        Err(Error::NoDescriptor)
    ));
}
