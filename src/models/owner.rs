/// Principal resolved from the `user-id` header by the owner middleware
#[derive(Debug, Clone)]
pub struct CurrentOwner {
    pub id: String,
}
