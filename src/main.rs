use shelfware_loadtest::{LoadTest, LoadTestError};

#[tokio::main]
async fn main() -> Result<(), LoadTestError> {
    LoadTest::initialize()?.execute().await?;

    Ok(())
}
