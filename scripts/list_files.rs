//! Run with: cargo run --bin list_files

use echoscribe::config::settings::Settings;
use echoscribe::config::storage::StorageLayout;
use echoscribe::modules::files::crud::MetadataStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let layout = StorageLayout::new(&settings.upload_dir, &settings.data_dir)
        .prepare()
        .await?;

    println!("Reading records from {}...", layout.metadata_dir().display());
    let store = MetadataStore::new(layout);
    let records = store.find_all(usize::MAX).await?;

    println!("\n{:<34} {:<9} {:>10} {:>9}  {}", "FILE ID", "STATUS", "BYTES", "SECONDS", "ORIGINAL NAME");
    println!("{:-<90}", "");
    for record in &records {
        let duration = record
            .duration_seconds
            .map(|d| format!("{:.1}", d))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<34} {:<9} {:>10} {:>9}  {}",
            record.file_id,
            record.status().as_str(),
            record.size_bytes,
            duration,
            record.original_name
        );
        if let Some(err) = record.conversion_error.as_ref().or(record.transcription_error.as_ref()) {
            println!("{:<34} ! {}", "", err.lines().next().unwrap_or_default());
        }
    }

    println!("\n✓ {} record(s)", records.len());
    Ok(())
}
