use natprobe::{detect, ProbeConfig};

#[tokio::main]
async fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    println!("Starting STUN NAT Type Detection...");
    println!("-----------------------------------");

    let verdict = match detect(ProbeConfig::default()).await {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error during detection: {}", e);
            std::process::exit(1);
        }
    };

    println!();
    println!("=== Final Result ===");
    println!("NAT Type:      {}", verdict.nat_type);
    println!("Reason:        {}", verdict.reason);
    if let Some(public) = verdict.public_address {
        println!("Public IP:     {}", public.ip);
        println!("Public Port:   {}", public.port);
    }
}
