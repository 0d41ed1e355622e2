pub mod audio_cache;
pub mod audio_player;
pub mod prefs;
pub mod voice_recorder;

pub use audio_cache::AudioCache;
pub use audio_player::{AudioPlayer, AudioSource, CommandPlayer, PlaybackOutcome};
pub use prefs::{LocalPrefs, PrefsFile, SessionSnapshot};
pub use voice_recorder::{
    CommandRecorder, RecordedAudio, RecorderSession, RecorderState, VoiceRecorder,
};
