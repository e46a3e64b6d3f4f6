use ndarray::Array2;
use skyprep::stats::{calc_stat, Estimator, StatConfig};
use skyprep::DqCatalog;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("DQ Flag Report Demonstration");
    println!("============================");
    println!();

    let catalog = DqCatalog::jwst();
    println!(
        "Catalog: {} flags, telescope {}",
        catalog.flags().len(),
        catalog
            .metadata()
            .get("TELESCOPE")
            .map(String::as_str)
            .unwrap_or("unknown")
    );
    println!();

    // A synthetic frame: a flat field with a hot column and a cosmic ray.
    let mut image = Array2::from_elem((64, 64), 100.0);
    let mut dq = Array2::<u32>::zeros((64, 64));
    for i in 0..64 {
        image[[i, 20]] = 4000.0;
        dq[[i, 20]] |= 2048; // HOT
    }
    dq[[10, 40]] |= 1 | 4; // DO_NOT_USE + JUMP_DET
    image[[10, 40]] = 9999.0;

    let planes = catalog.interpret_array(dq.view())?;
    println!("Flagged pixel populations:");
    for flag in catalog.flags() {
        if let Some(plane) = planes.get(&flag.value) {
            let count = plane.iter().filter(|&&b| b).count();
            if count > 0 {
                println!("  {:>6}  {:<12} {} px", flag.value, flag.short, count);
            }
        }
    }
    println!();

    // Robust background estimate, unfazed by the flagged structures.
    let sample: Vec<f64> = image.iter().copied().collect();
    let config = StatConfig {
        sigma: 1.8,
        max_iters: 10,
        estimator: Estimator::Median,
    };
    println!("Sigma-clipped background: {:.1}", calc_stat(&sample, &config));
    Ok(())
}
