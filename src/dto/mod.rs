pub mod chat_dto;
pub mod user_dto;
