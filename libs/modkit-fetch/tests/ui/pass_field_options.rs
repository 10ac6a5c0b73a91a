use modkit_fetch::{QueryEncode, QuerySource};

#[derive(QueryEncode)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

#[derive(QueryEncode)]
pub struct Search {
    #[query(rename = "q")]
    pub term: String,
    #[query(omitempty)]
    pub cursor: Option<String>,
    #[query(skip)]
    pub debug: bool,
    #[query(squash)]
    pub page: Page,
    pub Region: String,
}

fn main() {
    let search = Search {
        term: "a b".to_owned(),
        cursor: None,
        debug: true,
        page: Page {
            limit: 10,
            offset: 0,
        },
        Region: "EU".to_owned(),
    };
    let encoded = QuerySource::record(search).encode().unwrap();
    assert_eq!(encoded, "limit=10&offset=0&q=a+b&region=EU");
}
