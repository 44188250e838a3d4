use stress_test::{stress_test_convergence, stress_test_scaling};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {}", err);
            std::process::exit(1);
        }
    };

    match rt.block_on(async_main()) {
        Ok(true) => println!("\n✓ All stress tests converged!"),
        Ok(false) => {
            eprintln!("\n✗ Replicas diverged");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("\n✗ Stress test failed: {}", err);
            std::process::exit(1);
        }
    }
}

async fn async_main() -> folio_sdk::Result<bool> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC STRESS TESTS                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut converged = true;

    // Test 1: small scale
    let stats = stress_test_convergence(4, 50, 200).await?;
    stats.print();
    converged &= stats.converged;

    // Test 2: medium scale
    let stats = stress_test_convergence(10, 100, 1000).await?;
    stats.print();
    converged &= stats.converged;

    // Test 3: Scaling analysis
    converged &= stress_test_scaling(12, 4).await?;

    Ok(converged)
}
