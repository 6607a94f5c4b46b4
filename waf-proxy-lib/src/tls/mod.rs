pub mod acceptor;

pub use acceptor::build_rustls;
