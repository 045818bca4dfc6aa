pub mod book;
pub mod chat;
pub mod context;

pub mod credential {
    use serde::{Deserialize, Serialize};

    /// API credential persisted between runs.
    ///
    /// `logged_in` is false once the user logs out; an absent credential
    /// file means the same thing.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Credential {
        pub api_key: String,
        pub email: String,
        pub logged_in: bool,
    }

    impl Credential {
        pub fn new(api_key: impl Into<String>, email: impl Into<String>) -> Self {
            Self {
                api_key: api_key.into(),
                email: email.into(),
                logged_in: true,
            }
        }
    }
}
