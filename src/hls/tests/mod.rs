mod master_playlist;
