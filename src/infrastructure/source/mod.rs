pub mod ytdl;
