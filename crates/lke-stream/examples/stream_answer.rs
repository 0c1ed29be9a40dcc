use lke_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let client = LkeClient::from_env()?;
    let mut chunks = client.send_query("demo-visitor", "请简单介绍一下你自己")?;
    while let Some(chunk) = chunks.next_chunk().await {
        println!("{chunk}\n---");
    }
    Ok(())
}
