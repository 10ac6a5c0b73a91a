use modkit_fetch::QueryEncode;

#[derive(QueryEncode)]
pub struct Search {
    #[query(omitempty, omitempty)]
    pub term: String,
}

fn main() {}
