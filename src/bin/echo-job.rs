use std::io::Write;
use std::time::Duration;

// Test helper that writes "stdout N" and "stderr N" once every 500
// milliseconds for N = 1..=count. The repeat count is the only command
// line argument.
fn main() {
    let mut args = std::env::args().skip(1);
    let count: u64 = match args.next().map(|raw| raw.parse()) {
        Some(Ok(count)) => count,
        _ => {
            eprintln!("usage: echo-job <count>");
            std::process::exit(2);
        }
    };

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    for n in 1..=count {
        writeln!(stdout, "stdout {n}")
            .and_then(|()| stdout.flush())
            .expect("write to stdout");
        writeln!(stderr, "stderr {n}")
            .and_then(|()| stderr.flush())
            .expect("write to stderr");
        std::thread::sleep(Duration::from_millis(500));
    }
}
