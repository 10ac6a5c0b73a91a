use modkit_fetch::QueryEncode;

#[derive(QueryEncode)]
pub struct Search {
    #[query(sort)]
    pub term: String,
}

fn main() {}
