// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

pub mod encoder;
mod frame;
mod io;
mod pass;
mod queue;
mod session;
mod settings;
mod timestamps;
pub mod timing;
mod types;
mod util;
pub use types::*;
pub use encoder::{ CodecConfig, CodecControl, CodecInterface, CodecPacket, CodecPass, CustomEncoder, Encoder, EncoderBackend, EncoderInterface, EndUsage, PacketKind, SimulatedCodec, StatsBuffer };
pub use frame::*;
pub use io::{ MAX_STATS_FILE_SIZE, StatsWriter, read_stats_file };
pub use pass::*;
pub use queue::*;
pub use session::*;
pub use settings::*;
pub use timestamps::*;
pub use timing::TimeRescaler;
pub use util::average_bitrate_from_duration;
