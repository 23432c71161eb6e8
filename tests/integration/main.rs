//! End-to-end tests: feed messages in, trade records out.

mod mock_gateway;
mod pipeline;
