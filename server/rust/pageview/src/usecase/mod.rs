pub mod generate_page_view;
pub mod receive_page_view;

pub use generate_page_view::GeneratePageViewUseCase;
pub use receive_page_view::ReceivePageViewUseCase;
