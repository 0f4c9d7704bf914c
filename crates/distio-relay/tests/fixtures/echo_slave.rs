//! A minimal real child-process slave used by relay integration tests: one
//! "echo" task that returns its payload unchanged, enough to exercise a
//! genuine handshake/dispatch/exit round trip through the relay rather than
//! `InProcessTransport`.

use distio_slave::SlaveRuntime;

#[tokio::main]
async fn main() {
    let mut runtime = SlaveRuntime::new(0);
    runtime
        .register("echo", |payload| async move { Ok(payload) })
        .expect("echo is not a reserved task name");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    if let Err(e) = runtime.serve(stdin, stdout).await {
        eprintln!("distio-echo-slave exiting: {e}");
        std::process::exit(1);
    }
}
