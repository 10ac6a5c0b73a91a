use modkit_fetch::QueryEncode;

#[derive(QueryEncode)]
pub struct Search {
    #[query(rename = 5)]
    pub term: String,
}

fn main() {}
