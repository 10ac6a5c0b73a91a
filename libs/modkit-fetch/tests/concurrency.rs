#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use modkit_fetch::{HttpClient, QueryValues, Request};
use support::TestServer;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_client_many_tasks() {
    let server = TestServer::start().await;
    let client = HttpClient::builder().build().unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let client = client.clone();
            let url = server.url("/getquery");
            tokio::spawn(async move {
                let mut values = QueryValues::new();
                values.add("n", i.to_string());
                let response = client
                    .dispatch(Request::get(url).query(values))
                    .await
                    .unwrap();
                (i, response.text().await.unwrap())
            })
        })
        .collect();

    for task in tasks {
        let (i, body) = task.await.unwrap();
        assert_eq!(body, format!("n={i}"));
    }
    assert_eq!(server.requests().len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shared_client_by_reference() {
    let server = TestServer::start().await;
    let client = std::sync::Arc::new(HttpClient::builder().max_redirects(5).build().unwrap());

    let first = {
        let client = client.clone();
        let url = server.url("/redirect_test/301");
        tokio::spawn(async move { client.get(url).await.unwrap().text().await.unwrap() })
    };
    let second = {
        let client = client.clone();
        let url = server.url("/foo");
        tokio::spawn(async move { client.get(url).await.unwrap().text().await.unwrap() })
    };

    assert_eq!(first.await.unwrap(), "chain=done");
    assert_eq!(second.await.unwrap(), "foo");
}
