pub const RES_TX_ERR: &str = "Failed to send run to res_tx";
pub const RUN_TX_ERR: &str = "Failed to send run to run_tx";
pub const PREPARE_TX_ERR: &str = "Failed to send run to prepare_tx";
pub const STREAM_CLOSED_ERR: &str = "Run stream closed before reaching a terminal state";
