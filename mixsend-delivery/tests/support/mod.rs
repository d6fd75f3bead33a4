pub mod mock_server;
pub mod mock_socks;
