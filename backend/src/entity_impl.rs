pub mod haiku_like;
