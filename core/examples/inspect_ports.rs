//! Example: Show which processes own the ports given on the command line.
//!
//! ```text
//! cargo run -p portterminator-core --example inspect_ports -- 3000 8080
//! ```

use portterminator_core::{parse_port_args, Options, PortTerminator, DEFAULT_MAX_RANGE_SIZE};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let ports = match parse_port_args(&args, DEFAULT_MAX_RANGE_SIZE) {
        Ok(ports) if !ports.is_empty() => ports,
        Ok(_) => {
            eprintln!("usage: inspect_ports <PORT>...");
            return;
        }
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let terminator = match PortTerminator::system(Options::default()) {
        Ok(terminator) => terminator,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    for port in ports {
        match terminator.get_processes(port).await {
            Ok(processes) if processes.is_empty() => println!("{:<6} free", port),
            Ok(processes) => {
                for process in processes {
                    println!(
                        "{:<6} {:<4} {:<8} {:<20} {}",
                        port,
                        process.protocol,
                        process.pid,
                        process.name,
                        process.command.as_deref().unwrap_or("-")
                    );
                }
            }
            Err(e) => eprintln!("{:<6} error: {}", port, e),
        }
    }
}
